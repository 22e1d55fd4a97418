//! Transports.
//!
//! The protocol core only needs a fire-and-forget `send` and a non-blocking
//! drain of everything delivered so far.
//!
//! Implements:
//! - Emulated in-process network (simulation and tests)
//! - UDP datagram transport (deployment)

mod emulated;
mod udp;

pub use emulated::{EmulatedNetwork, LinkStats};
pub use udp::UdpTransport;

use bytes::Bytes;
use murmur_common::{MurmurError, NodeIdentity};
use std::sync::Arc;

/// Message delivery between node identities
pub trait Transport {
    /// Send `payload` from `from` to `to`. Delivery is not guaranteed even on `Ok`.
    fn send(&self, from: NodeIdentity, to: NodeIdentity, payload: Bytes)
    -> Result<(), MurmurError>;

    /// Drain every payload buffered for `me`, oldest first
    fn poll_inbound(&self, me: NodeIdentity) -> Vec<Bytes>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(
        &self,
        from: NodeIdentity,
        to: NodeIdentity,
        payload: Bytes,
    ) -> Result<(), MurmurError> {
        (**self).send(from, to, payload)
    }

    fn poll_inbound(&self, me: NodeIdentity) -> Vec<Bytes> {
        (**self).poll_inbound(me)
    }
}
