//! In-process emulated network.
//!
//! Every registered node gets a FIFO inbound queue. Sends may be dropped at
//! a configurable rate (seeded, so runs are reproducible), and nodes can be
//! crash-stopped, after which sends to them fail and their queue is discarded.

use bytes::Bytes;
use murmur_common::{MurmurError, NodeIdentity};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

use super::Transport;

/// Per-node traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Messages this node handed to the network
    pub sent: u64,
    /// Messages delivered into this node's queue
    pub received: u64,
    /// Messages addressed to this node that the network dropped
    pub dropped: u64,
}

struct NetState {
    queues: HashMap<NodeIdentity, VecDeque<Bytes>>,
    failed: HashSet<NodeIdentity>,
    stats: HashMap<NodeIdentity, LinkStats>,
    rng: StdRng,
}

/// Lossy in-memory network shared by every node of a simulated cluster
pub struct EmulatedNetwork {
    drop_rate: f64,
    state: Mutex<NetState>,
}

impl EmulatedNetwork {
    /// Create a network that drops each message with probability `drop_rate`
    pub fn new(drop_rate: f64, seed: u64) -> Self {
        Self {
            drop_rate: drop_rate.clamp(0.0, 1.0),
            state: Mutex::new(NetState {
                queues: HashMap::new(),
                failed: HashSet::new(),
                stats: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
        }
    }

    /// Lossless network
    pub fn reliable() -> Self {
        Self::new(0.0, 0)
    }

    pub fn register(&self, id: NodeIdentity) {
        let mut state = self.state.lock();
        state.queues.entry(id).or_default();
        state.stats.entry(id).or_default();
        state.failed.remove(&id);
    }

    /// Crash-stop `id`: pending messages are lost and later sends fail
    pub fn fail(&self, id: NodeIdentity) {
        let mut state = self.state.lock();
        state.failed.insert(id);
        if let Some(queue) = state.queues.get_mut(&id) {
            queue.clear();
        }
        tracing::debug!(node = %id, "Emulated node failed");
    }

    /// Messages waiting for `id`
    pub fn pending(&self, id: &NodeIdentity) -> usize {
        self.state.lock().queues.get(id).map_or(0, VecDeque::len)
    }

    pub fn stats(&self, id: &NodeIdentity) -> LinkStats {
        self.state.lock().stats.get(id).copied().unwrap_or_default()
    }

    /// Counters for every registered node, sorted by identity
    pub fn all_stats(&self) -> Vec<(NodeIdentity, LinkStats)> {
        let state = self.state.lock();
        let mut all: Vec<_> = state.stats.iter().map(|(id, s)| (*id, *s)).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}

impl Transport for EmulatedNetwork {
    fn send(
        &self,
        from: NodeIdentity,
        to: NodeIdentity,
        payload: Bytes,
    ) -> Result<(), MurmurError> {
        let mut state = self.state.lock();

        if state.failed.contains(&to) || !state.queues.contains_key(&to) {
            return Err(MurmurError::Transport(format!("{} is unreachable", to)));
        }

        state.stats.entry(from).or_default().sent += 1;

        let drop_rate = self.drop_rate;
        if drop_rate > 0.0 && state.rng.random_bool(drop_rate) {
            state.stats.entry(to).or_default().dropped += 1;
            tracing::trace!(from = %from, to = %to, "Emulated message dropped");
            return Ok(());
        }

        if let Some(queue) = state.queues.get_mut(&to) {
            queue.push_back(payload);
        }
        state.stats.entry(to).or_default().received += 1;

        Ok(())
    }

    fn poll_inbound(&self, me: NodeIdentity) -> Vec<Bytes> {
        let mut state = self.state.lock();
        if state.failed.contains(&me) {
            return Vec::new();
        }
        state
            .queues
            .get_mut(&me)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeIdentity {
        NodeIdentity::from_index(n)
    }

    #[test]
    fn test_delivery_is_fifo_and_draining() {
        let net = EmulatedNetwork::reliable();
        net.register(id(1));
        net.register(id(2));

        net.send(id(1), id(2), Bytes::from_static(b"a")).unwrap();
        net.send(id(1), id(2), Bytes::from_static(b"b")).unwrap();
        assert_eq!(net.pending(&id(2)), 2);

        let got = net.poll_inbound(id(2));
        assert_eq!(got, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
        assert!(net.poll_inbound(id(2)).is_empty());

        assert_eq!(net.stats(&id(1)).sent, 2);
        assert_eq!(net.stats(&id(2)).received, 2);
    }

    #[test]
    fn test_send_to_unknown_or_failed_node_errors() {
        let net = EmulatedNetwork::reliable();
        net.register(id(1));
        net.register(id(2));

        let err = net.send(id(1), id(9), Bytes::new()).unwrap_err();
        assert!(err.is_transient());

        net.send(id(1), id(2), Bytes::from_static(b"x")).unwrap();
        net.fail(id(2));
        assert_eq!(net.pending(&id(2)), 0);
        assert!(net.send(id(1), id(2), Bytes::new()).is_err());
        assert!(net.poll_inbound(id(2)).is_empty());
    }

    #[test]
    fn test_full_drop_rate_loses_everything() {
        let net = EmulatedNetwork::new(1.0, 42);
        net.register(id(1));
        net.register(id(2));

        for _ in 0..10 {
            net.send(id(1), id(2), Bytes::from_static(b"x")).unwrap();
        }
        assert_eq!(net.pending(&id(2)), 0);
        assert_eq!(net.stats(&id(2)).dropped, 10);
    }
}
