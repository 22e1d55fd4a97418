//! Timeout-based failure detection.
//!
//! An entry is evicted once `local_clock - last_update` strictly exceeds the
//! removal threshold. The suspicion threshold is only reported, never acted on.

use murmur_common::{MembershipEntry, NodeIdentity, Tick};

use crate::membership::MembershipTable;

#[derive(Debug, Clone, Copy)]
pub struct FailureDetector {
    remove_threshold: Tick,
    fail_threshold: Tick,
}

impl FailureDetector {
    pub fn new(remove_threshold: Tick, fail_threshold: Tick) -> Self {
        Self {
            remove_threshold,
            fail_threshold,
        }
    }

    /// Evict every stale entry except `me`; returns what was removed
    pub fn sweep(
        &self,
        table: &mut MembershipTable,
        now: Tick,
        me: NodeIdentity,
    ) -> Vec<MembershipEntry> {
        let removed = table
            .stale_ids(now, self.remove_threshold)
            .into_iter()
            .filter(|id| *id != me)
            .filter_map(|id| table.remove(&id, now))
            .collect();

        table.purge_tombstones(now);
        removed
    }

    /// Entries stale past the suspicion threshold but not yet evicted
    pub fn suspects(&self, table: &MembershipTable, now: Tick) -> Vec<NodeIdentity> {
        table.stale_ids(now, self.fail_threshold)
    }
}
