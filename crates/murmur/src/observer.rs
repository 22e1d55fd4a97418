//! Membership change notifications.
//!
//! The node calls its observer synchronously at the point each entry is
//! inserted or evicted.

use murmur_common::{NodeIdentity, Tick};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives added/removed events from one node
pub trait MembershipObserver {
    fn on_member_added(&self, node: NodeIdentity, peer: NodeIdentity);
    fn on_member_removed(&self, node: NodeIdentity, peer: NodeIdentity);
}

/// Logs every change through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MembershipObserver for TracingObserver {
    fn on_member_added(&self, node: NodeIdentity, peer: NodeIdentity) {
        tracing::info!(node = %node, peer = %peer, "➕ Member added");
    }

    fn on_member_removed(&self, node: NodeIdentity, peer: NodeIdentity) {
        tracing::info!(node = %node, peer = %peer, "➖ Member removed");
    }
}

/// Fan one event out to two observers
impl<A: MembershipObserver, B: MembershipObserver> MembershipObserver for (A, B) {
    fn on_member_added(&self, node: NodeIdentity, peer: NodeIdentity) {
        self.0.on_member_added(node, peer);
        self.1.on_member_added(node, peer);
    }

    fn on_member_removed(&self, node: NodeIdentity, peer: NodeIdentity) {
        self.0.on_member_removed(node, peer);
        self.1.on_member_removed(node, peer);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Added,
    Removed,
}

/// One recorded membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MembershipEvent {
    /// Harness tick at which the event fired
    pub tick: Tick,
    pub node: NodeIdentity,
    pub peer: NodeIdentity,
    pub kind: EventKind,
}

/// Shared, cloneable event recorder.
///
/// Clones append to the same log. The harness stamps events with the tick
/// set through [`EventLog::set_tick`].
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<MembershipEvent>>>,
    tick: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tick(&self, tick: Tick) {
        self.tick.store(tick, Ordering::Relaxed);
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Events reported by `node` about `peer`
    pub fn between(&self, node: NodeIdentity, peer: NodeIdentity) -> Vec<MembershipEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.node == node && e.peer == peer)
            .copied()
            .collect()
    }

    fn record(&self, node: NodeIdentity, peer: NodeIdentity, kind: EventKind) {
        let tick = self.tick.load(Ordering::Relaxed);
        self.events.lock().push(MembershipEvent {
            tick,
            node,
            peer,
            kind,
        });
    }
}

impl MembershipObserver for EventLog {
    fn on_member_added(&self, node: NodeIdentity, peer: NodeIdentity) {
        self.record(node, peer, EventKind::Added);
    }

    fn on_member_removed(&self, node: NodeIdentity, peer: NodeIdentity) {
        self.record(node, peer, EventKind::Removed);
    }
}
