//! Heartbeat gossip and anti-entropy merge.

use rand::Rng;

use super::Node;
use crate::membership::MergeOutcome;
use crate::observer::MembershipObserver;
use crate::protocol::{GossipRecord, Message};
use crate::transport::Transport;

impl<T, O, R> Node<T, O, R>
where
    T: Transport,
    O: MembershipObserver,
    R: Rng,
{
    /// Send side of one tick: bump heartbeat and clock, refresh the self
    /// entry, then push the whole table to `min(fanout, |table|)` peers drawn
    /// with replacement. Returns the number of gossip messages sent.
    pub fn gossip_round(&mut self) -> usize {
        self.state.own_heartbeat += 1;
        self.state.local_clock += 1;

        let me = self.state.identity;
        let now = self.state.local_clock;
        self.state
            .table
            .refresh(&me, self.state.own_heartbeat, now);

        if self.state.table.is_empty() {
            return 0;
        }

        let k = self.protocol.fanout.min(self.state.table.len());
        let targets = self.state.table.sample_with_replacement(&mut self.rng, k);
        let message = Message::gossip(self.state.table.heartbeats());

        for target in &targets {
            self.send(*target, &message);
        }

        tracing::trace!(
            node = %me,
            heartbeat = self.state.own_heartbeat,
            members = self.state.table.len(),
            fanout = targets.len(),
            "Gossip round"
        );

        targets.len()
    }

    /// Receive side: per-key max merge of every gossiped entry
    pub(super) fn merge_gossip(&mut self, entries: &[GossipRecord]) {
        let me = self.state.identity;
        let now = self.state.local_clock;

        for record in entries {
            match self.state.table.merge(record.id, record.heartbeat, now) {
                MergeOutcome::Inserted => {
                    self.observer.on_member_added(me, record.id);
                }
                MergeOutcome::Suppressed => {
                    tracing::trace!(node = %me, peer = %record.id, "Ignoring evicted member");
                }
                MergeOutcome::Raised | MergeOutcome::Stale => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::config::ProtocolConfig;
    use crate::observer::{EventKind, EventLog};
    use crate::protocol::Message;
    use crate::transport::{EmulatedNetwork, Transport};
    use std::sync::Arc;

    #[test]
    fn test_empty_table_sends_nothing() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let mut a = node(1, &net, &EventLog::new(), ProtocolConfig::default());
        a.start();

        assert_eq!(a.gossip_round(), 0);
        assert_eq!(a.state().own_heartbeat, 1);
        assert_eq!(a.state().local_clock, 1);
        assert!(a.table().is_empty());
    }

    #[test]
    fn test_fanout_bound() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let log = EventLog::new();
        let mut a = node(1, &net, &log, ProtocolConfig::default());
        net.register(id(2));
        a.start();

        a.handle_join_request(id(2), 0);
        assert_eq!(a.gossip_round(), 2);

        for n in 3..=8 {
            net.register(id(n));
            a.handle_join_request(id(n), 0);
        }
        for n in 2..=8 {
            net.poll_inbound(id(n));
        }
        net.poll_inbound(id(1));

        assert_eq!(a.gossip_round(), 3);
        let delivered: usize = (1..=8).map(|n| net.poll_inbound(id(n)).len()).sum();
        assert_eq!(delivered, 3);
    }

    #[test]
    fn test_self_refresh() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let mut a = node(1, &net, &EventLog::new(), ProtocolConfig::default());
        a.start();
        a.handle_join_request(id(2), 0);

        for _ in 0..4 {
            a.gossip_round();
        }
        let me = a.table().get(&id(1)).unwrap();
        assert_eq!(me.heartbeat, 4);
        assert_eq!(me.last_update, 4);
    }

    #[test]
    fn test_gossip_carries_full_table() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let mut a = node(1, &net, &EventLog::new(), ProtocolConfig::default());
        net.register(id(2));
        a.start();
        a.handle_join_request(id(2), 7);
        net.poll_inbound(id(2));

        a.gossip_round();
        let payloads: Vec<_> = [id(1), id(2)]
            .iter()
            .flat_map(|n| net.poll_inbound(*n))
            .collect();
        assert!(!payloads.is_empty());

        for payload in payloads {
            let Message::Gossip { entries } = Message::decode(&payload).unwrap() else {
                panic!("expected gossip");
            };
            let pairs: Vec<_> = entries.iter().map(|r| (r.id, r.heartbeat)).collect();
            assert_eq!(pairs, vec![(id(1), 1), (id(2), 7)]);
        }
    }

    #[test]
    fn test_lower_heartbeat_discarded() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let mut a = node(1, &net, &EventLog::new(), ProtocolConfig::default());
        a.start();
        a.merge_gossip(&gossip_records(&[(7, 4)]));

        a.merge_gossip(&gossip_records(&[(7, 2)]));
        assert_eq!(a.table().get(&id(7)).unwrap().heartbeat, 4);
    }

    #[test]
    fn test_merge_is_idempotent_and_notifies_once() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let log = EventLog::new();
        let mut a = node(1, &net, &log, ProtocolConfig::default());
        a.start();

        let first = gossip_records(&[(3, 5), (4, 1)]);
        let second = gossip_records(&[(4, 9), (3, 2)]);
        a.merge_gossip(&second);
        a.merge_gossip(&first);
        a.merge_gossip(&second);
        a.merge_gossip(&first);

        assert_eq!(a.table().get(&id(3)).unwrap().heartbeat, 5);
        assert_eq!(a.table().get(&id(4)).unwrap().heartbeat, 9);
        assert_eq!(log.len(), 2);
        assert!(log.events().iter().all(|e| e.kind == EventKind::Added));
    }

    #[test]
    fn test_raise_resets_last_update() {
        let net = Arc::new(EmulatedNetwork::reliable());
        let mut a = node(1, &net, &EventLog::new(), ProtocolConfig::default());
        a.start();
        a.merge_gossip(&gossip_records(&[(5, 1)]));

        for _ in 0..6 {
            a.gossip_round();
        }
        a.merge_gossip(&gossip_records(&[(5, 2)]));
        assert_eq!(a.table().get(&id(5)).unwrap().last_update, 6);
    }

    fn gossip_records(pairs: &[(u32, u64)]) -> Vec<crate::protocol::GossipRecord> {
        let Message::Gossip { entries } =
            Message::gossip(pairs.iter().map(|(n, hb)| (id(*n), *hb)))
        else {
            unreachable!();
        };
        entries
    }
}
