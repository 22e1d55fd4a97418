//! Core types shared across Murmur components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::error::MurmurError;

/// Local logical time, advanced once per protocol tick
pub type Tick = u64;

/// Stable (address, port) pair identifying a peer.
///
/// Maps one-to-one onto a `SocketAddrV4`, which is also how the UDP
/// transport addresses peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl NodeIdentity {
    pub const fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Identity used by the emulated network: the index is the address, port 0.
    ///
    /// Index 1 is the conventional introducer.
    pub fn from_index(index: u32) -> Self {
        Self::new(Ipv4Addr::from(index), 0)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.addr, self.port))
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl From<SocketAddrV4> for NodeIdentity {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl TryFrom<SocketAddr> for NodeIdentity {
    type Error = MurmurError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(v6) => Err(MurmurError::Config(format!(
                "IPv6 address {} cannot be a node identity",
                v6
            ))),
        }
    }
}

impl FromStr for NodeIdentity {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddrV4>()
            .map(Self::from)
            .map_err(|e| MurmurError::Config(format!("invalid node address '{}': {}", s, e)))
    }
}

/// Best-known liveness record for one peer.
///
/// `last_update` is the *local* tick at which `heartbeat` last increased.
/// It is never sent on the wire and never compared across nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEntry {
    pub id: NodeIdentity,
    pub heartbeat: u64,
    pub last_update: Tick,
}

impl MembershipEntry {
    pub fn new(id: NodeIdentity, heartbeat: u64, last_update: Tick) -> Self {
        Self {
            id,
            heartbeat,
            last_update,
        }
    }

    /// Ticks elapsed since the heartbeat last increased
    pub fn staleness(&self, now: Tick) -> Tick {
        now.saturating_sub(self.last_update)
    }
}

/// Join handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinState {
    /// Freshly started, nothing sent yet
    NotJoined,
    /// JoinRequest sent to the introducer, waiting for JoinReply
    AwaitingReply,
    /// Member of the group (terminal)
    Joined,
    /// Join retries exhausted (terminal, only with join retry enabled)
    JoinFailed,
}

impl JoinState {
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined)
    }
}

impl Default for JoinState {
    fn default() -> Self {
        Self::NotJoined
    }
}
