//! Message encoding and decoding.
//!
//! Layout (all integers big-endian):
//! ```text
//! JoinRequest: [0u8][addr: 4][port: 2][heartbeat: 8]
//! JoinReply:   [1u8]
//! Gossip:      [2u8][count: 8]{[addr: 4][port: 2][heartbeat: 8]} * count
//! ```
//! Local timestamps are never serialized.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use murmur_common::constants::wire::{
    COUNT_LEN, ENTRY_LEN, HEARTBEAT_LEN, IDENTITY_LEN, TAG_GOSSIP, TAG_JOIN_REPLY,
    TAG_JOIN_REQUEST,
};
use murmur_common::{MurmurError, NodeIdentity};
use std::net::Ipv4Addr;

/// One gossiped (id, heartbeat) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GossipRecord {
    pub id: NodeIdentity,
    pub heartbeat: u64,
}

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Ask the introducer to admit `sender` into the group
    JoinRequest { sender: NodeIdentity, heartbeat: u64 },
    /// Introducer accepted the join
    JoinReply,
    /// Full snapshot of the sender's table
    Gossip { entries: Vec<GossipRecord> },
}

impl Message {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRequest { .. } => "join_request",
            Self::JoinReply => "join_reply",
            Self::Gossip { .. } => "gossip",
        }
    }

    /// Build a gossip message from (id, heartbeat) pairs
    pub fn gossip(pairs: impl IntoIterator<Item = (NodeIdentity, u64)>) -> Self {
        Self::Gossip {
            entries: pairs
                .into_iter()
                .map(|(id, heartbeat)| GossipRecord { id, heartbeat })
                .collect(),
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Self::JoinRequest { .. } => IDENTITY_LEN + HEARTBEAT_LEN,
            Self::JoinReply => 0,
            Self::Gossip { entries } => COUNT_LEN + entries.len() * ENTRY_LEN,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        match self {
            Self::JoinRequest { sender, heartbeat } => {
                buf.put_u8(TAG_JOIN_REQUEST);
                put_identity(&mut buf, sender);
                buf.put_u64(*heartbeat);
            }
            Self::JoinReply => {
                buf.put_u8(TAG_JOIN_REPLY);
            }
            Self::Gossip { entries } => {
                buf.put_u8(TAG_GOSSIP);
                buf.put_u64(entries.len() as u64);
                for record in entries {
                    put_identity(&mut buf, &record.id);
                    buf.put_u64(record.heartbeat);
                }
            }
        }

        buf.freeze()
    }

    /// Decode a complete message. The tag is validated before the body is read.
    pub fn decode(mut buf: &[u8]) -> Result<Self, MurmurError> {
        if !buf.has_remaining() {
            return Err(MurmurError::MalformedMessage("empty buffer".to_string()));
        }

        let message = match buf.get_u8() {
            TAG_JOIN_REQUEST => {
                ensure_remaining(buf, IDENTITY_LEN + HEARTBEAT_LEN, "join request")?;
                let sender = get_identity(&mut buf);
                let heartbeat = buf.get_u64();
                Self::JoinRequest { sender, heartbeat }
            }
            TAG_JOIN_REPLY => Self::JoinReply,
            TAG_GOSSIP => {
                ensure_remaining(buf, COUNT_LEN, "gossip header")?;
                let count = buf.get_u64();
                let body_len = usize::try_from(count)
                    .ok()
                    .and_then(|n| n.checked_mul(ENTRY_LEN))
                    .ok_or_else(|| {
                        MurmurError::MalformedMessage(format!("entry count {} overflows", count))
                    })?;
                ensure_remaining(buf, body_len, "gossip entries")?;

                let mut entries = Vec::with_capacity(body_len / ENTRY_LEN);
                for _ in 0..count {
                    let id = get_identity(&mut buf);
                    let heartbeat = buf.get_u64();
                    entries.push(GossipRecord { id, heartbeat });
                }
                Self::Gossip { entries }
            }
            other => return Err(MurmurError::UnknownMessageKind(other)),
        };

        if buf.has_remaining() {
            return Err(MurmurError::MalformedMessage(format!(
                "{} trailing bytes after {}",
                buf.remaining(),
                message.kind()
            )));
        }

        Ok(message)
    }
}

fn put_identity(buf: &mut BytesMut, id: &NodeIdentity) {
    buf.put_slice(&id.addr.octets());
    buf.put_u16(id.port);
}

fn get_identity(buf: &mut &[u8]) -> NodeIdentity {
    let addr = Ipv4Addr::from(buf.get_u32());
    let port = buf.get_u16();
    NodeIdentity::new(addr, port)
}

fn ensure_remaining(buf: &[u8], needed: usize, what: &str) -> Result<(), MurmurError> {
    if buf.len() < needed {
        return Err(MurmurError::MalformedMessage(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            needed,
            buf.len()
        )));
    }
    Ok(())
}
