//! Membership node.
//!
//! A node is a single-threaded actor: one owner drives [`Node::tick`] at a
//! fixed cadence, and messages only reach the protocol through the inbound
//! drain at the start of each tick.
//!
//! Per tick:
//! 1. Drain and dispatch all inbound messages
//! 2. If not joined, maybe re-send the join request and stop
//! 3. Gossip round (heartbeat bump, self refresh, fan-out)
//! 4. Failure detection sweep

mod detector;
mod gossip;
mod join;

pub use detector::FailureDetector;

use murmur_common::{JoinState, MembershipEntry, NodeIdentity, Tick};
use rand::Rng;
use serde::Serialize;

use crate::config::ProtocolConfig;
use crate::membership::MembershipTable;
use crate::observer::MembershipObserver;
use crate::protocol::Message;
use crate::transport::Transport;

/// Join handshake bookkeeping
#[derive(Debug, Clone, Copy, Default)]
struct JoinProgress {
    state: JoinState,
    /// JoinRequests sent so far
    attempts: u32,
    /// Ticks since the last JoinRequest
    waited: u64,
}

/// Everything a node owns
#[derive(Debug, Clone)]
pub struct NodeState {
    pub identity: NodeIdentity,
    pub own_heartbeat: u64,
    pub local_clock: Tick,
    pub table: MembershipTable,
    join: JoinProgress,
}

impl NodeState {
    fn new(identity: NodeIdentity, tombstone_ticks: u64) -> Self {
        Self {
            identity,
            own_heartbeat: 0,
            local_clock: 0,
            table: MembershipTable::with_tombstones(tombstone_ticks),
            join: JoinProgress::default(),
        }
    }

    pub fn join_state(&self) -> JoinState {
        self.join.state
    }

    pub fn joined(&self) -> bool {
        self.join.state.is_joined()
    }
}

/// One table row as seen from this node
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: NodeIdentity,
    pub heartbeat: u64,
    pub last_update: Tick,
    pub staleness: Tick,
}

/// Serializable view of a node's state
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub identity: NodeIdentity,
    pub join_state: JoinState,
    pub heartbeat: u64,
    pub local_clock: Tick,
    pub members: Vec<MemberView>,
    /// Members stale past the suspicion threshold
    pub suspects: Vec<NodeIdentity>,
    /// Evicted ids still barred from re-insertion
    pub tombstones: usize,
}

/// Membership protocol engine for one node
pub struct Node<T, O, R> {
    state: NodeState,
    bootstrap: NodeIdentity,
    protocol: ProtocolConfig,
    detector: FailureDetector,
    transport: T,
    observer: O,
    rng: R,
}

impl<T, O, R> Node<T, O, R>
where
    T: Transport,
    O: MembershipObserver,
    R: Rng,
{
    pub fn new(
        identity: NodeIdentity,
        bootstrap: NodeIdentity,
        protocol: ProtocolConfig,
        transport: T,
        observer: O,
        rng: R,
    ) -> Self {
        let detector = FailureDetector::new(protocol.remove_threshold, protocol.fail_threshold);
        Self {
            state: NodeState::new(identity, protocol.tombstone_ticks),
            bootstrap,
            protocol,
            detector,
            transport,
            observer,
            rng,
        }
    }

    pub fn identity(&self) -> NodeIdentity {
        self.state.identity
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn table(&self) -> &MembershipTable {
        &self.state.table
    }

    pub fn is_joined(&self) -> bool {
        self.state.joined()
    }

    /// Run one protocol tick
    pub fn tick(&mut self) {
        self.drain_inbound();

        if !self.state.joined() {
            self.retry_join_if_due();
            return;
        }

        self.gossip_round();
        self.detect_failures();
    }

    /// Process every message queued so far; returns how many were handled
    pub fn drain_inbound(&mut self) -> usize {
        let payloads = self.transport.poll_inbound(self.state.identity);
        let mut handled = 0;

        for payload in payloads {
            match Message::decode(&payload) {
                Ok(message) => {
                    self.dispatch(message);
                    handled += 1;
                }
                Err(e) if e.is_discardable() => {
                    tracing::warn!(
                        node = %self.state.identity,
                        len = payload.len(),
                        error = %e,
                        "Discarding undecodable message"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        node = %self.state.identity,
                        error = %e,
                        "Unexpected decode failure, message dropped"
                    );
                }
            }
        }

        handled
    }

    fn dispatch(&mut self, message: Message) {
        tracing::trace!(node = %self.state.identity, kind = message.kind(), "Dispatching");

        match message {
            Message::JoinRequest { sender, heartbeat } => {
                self.handle_join_request(sender, heartbeat)
            }
            Message::JoinReply => self.handle_join_reply(),
            Message::Gossip { entries } => self.merge_gossip(&entries),
        }
    }

    /// Fire-and-forget send; failures are indistinguishable from packet loss
    fn send(&self, to: NodeIdentity, message: &Message) {
        match self.transport.send(self.state.identity, to, message.encode()) {
            Ok(()) => {}
            Err(e) if e.is_transient() => tracing::debug!(
                node = %self.state.identity,
                peer = %to,
                kind = message.kind(),
                error = %e,
                "Send failed, treating as loss"
            ),
            Err(e) => tracing::warn!(
                node = %self.state.identity,
                peer = %to,
                error = %e,
                "Send failed"
            ),
        }
    }

    /// Failure detector pass over the table
    pub fn detect_failures(&mut self) -> Vec<MembershipEntry> {
        let me = self.state.identity;
        let removed = self
            .detector
            .sweep(&mut self.state.table, self.state.local_clock, me);

        for entry in &removed {
            tracing::debug!(
                node = %me,
                peer = %entry.id,
                heartbeat = entry.heartbeat,
                staleness = entry.staleness(self.state.local_clock),
                "Evicting stale member"
            );
            self.observer.on_member_removed(me, entry.id);
        }

        removed
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let now = self.state.local_clock;
        NodeSnapshot {
            identity: self.state.identity,
            join_state: self.state.join_state(),
            heartbeat: self.state.own_heartbeat,
            local_clock: now,
            members: self
                .state
                .table
                .iter()
                .map(|e| MemberView {
                    id: e.id,
                    heartbeat: e.heartbeat,
                    last_update: e.last_update,
                    staleness: e.staleness(now),
                })
                .collect(),
            suspects: self.detector.suspects(&self.state.table, now),
            tombstones: self.state.table.tombstone_count(),
        }
    }
}
