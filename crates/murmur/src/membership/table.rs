//! Per-node membership table.
//!
//! Maps each known peer to its best-known heartbeat and the local tick at
//! which that heartbeat was last seen to increase. Heartbeats only ever go
//! up: every write path is a per-key max.

use murmur_common::{MembershipEntry, NodeIdentity, Tick};
use rand::Rng;
use std::collections::BTreeMap;

/// Result of merging one remote (id, heartbeat) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Id was unknown and has been inserted
    Inserted,
    /// Incoming heartbeat was higher; stored heartbeat raised
    Raised,
    /// Incoming heartbeat was equal or lower; nothing changed
    Stale,
    /// Id was recently evicted and the heartbeat is not newer than at eviction
    Suppressed,
}

/// Memory of an evicted entry, used to stop stale gossip from reviving it
#[derive(Debug, Clone, Copy)]
struct Tombstone {
    heartbeat: u64,
    removed_at: Tick,
}

/// Membership table owned by exactly one node
#[derive(Debug, Default, Clone)]
pub struct MembershipTable {
    entries: BTreeMap<NodeIdentity, MembershipEntry>,
    tombstones: BTreeMap<NodeIdentity, Tombstone>,
    /// How long evicted ids stay suppressed (0 = never suppress)
    tombstone_ticks: Tick,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that suppresses re-insertion of evicted ids for `ticks` ticks
    pub fn with_tombstones(ticks: Tick) -> Self {
        Self {
            tombstone_ticks: ticks,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &NodeIdentity) -> Option<&MembershipEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &NodeIdentity) -> bool {
        self.entries.contains_key(id)
    }

    /// Entries in identity order
    pub fn iter(&self) -> impl Iterator<Item = &MembershipEntry> {
        self.entries.values()
    }

    /// Merge one remote observation using the higher-heartbeat-wins rule.
    ///
    /// New ids are inserted with the heartbeat carried in the message.
    pub fn merge(&mut self, id: NodeIdentity, heartbeat: u64, now: Tick) -> MergeOutcome {
        if let Some(entry) = self.entries.get_mut(&id) {
            if heartbeat > entry.heartbeat {
                entry.heartbeat = heartbeat;
                entry.last_update = now;
                return MergeOutcome::Raised;
            }
            return MergeOutcome::Stale;
        }

        if let Some(tomb) = self.tombstones.get(&id) {
            if now.saturating_sub(tomb.removed_at) <= self.tombstone_ticks
                && heartbeat <= tomb.heartbeat
            {
                return MergeOutcome::Suppressed;
            }
        }

        self.tombstones.remove(&id);
        self.entries
            .insert(id, MembershipEntry::new(id, heartbeat, now));
        MergeOutcome::Inserted
    }

    /// Insert an entry unconditionally if the id is unknown (join path).
    ///
    /// Clears any tombstone for the id. If the id is already present the
    /// regular merge rule applies instead. Returns true if a new entry was added.
    pub fn admit(&mut self, id: NodeIdentity, heartbeat: u64, now: Tick) -> bool {
        self.tombstones.remove(&id);
        self.merge(id, heartbeat, now) == MergeOutcome::Inserted
    }

    /// Refresh an existing entry as freshly observed (self-refresh).
    ///
    /// Heartbeat is raised to `heartbeat` but never lowered. Absent ids are
    /// left absent. Returns true if the entry existed.
    pub fn refresh(&mut self, id: &NodeIdentity, heartbeat: u64, now: Tick) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.heartbeat = entry.heartbeat.max(heartbeat);
                entry.last_update = now;
                true
            }
            None => false,
        }
    }

    /// Remove an entry, remembering its heartbeat as a tombstone
    pub fn remove(&mut self, id: &NodeIdentity, now: Tick) -> Option<MembershipEntry> {
        let removed = self.entries.remove(id)?;
        if self.tombstone_ticks > 0 {
            self.tombstones.insert(
                *id,
                Tombstone {
                    heartbeat: removed.heartbeat,
                    removed_at: now,
                },
            );
        }
        Some(removed)
    }

    /// Ids whose staleness strictly exceeds `threshold`
    pub fn stale_ids(&self, now: Tick, threshold: Tick) -> Vec<NodeIdentity> {
        self.entries
            .values()
            .filter(|e| e.staleness(now) > threshold)
            .map(|e| e.id)
            .collect()
    }

    /// Drop tombstones older than the suppression window
    pub fn purge_tombstones(&mut self, now: Tick) {
        let window = self.tombstone_ticks;
        self.tombstones
            .retain(|_, t| now.saturating_sub(t.removed_at) <= window);
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Draw `k` ids uniformly at random, with replacement
    pub fn sample_with_replacement<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        k: usize,
    ) -> Vec<NodeIdentity> {
        if self.entries.is_empty() {
            return Vec::new();
        }

        let ids: Vec<NodeIdentity> = self.entries.keys().copied().collect();
        (0..k)
            .map(|_| ids[rng.random_range(0..ids.len())])
            .collect()
    }

    /// (id, heartbeat) pairs for a gossip payload; local timestamps stay here
    pub fn heartbeats(&self) -> Vec<(NodeIdentity, u64)> {
        self.entries
            .values()
            .map(|e| (e.id, e.heartbeat))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn id(n: u32) -> NodeIdentity {
        NodeIdentity::from_index(n)
    }

    #[test]
    fn test_merge_inserts_with_received_heartbeat() {
        let mut table = MembershipTable::new();
        assert_eq!(table.merge(id(3), 17, 4), MergeOutcome::Inserted);

        let entry = table.get(&id(3)).unwrap();
        assert_eq!(entry.heartbeat, 17);
        assert_eq!(entry.last_update, 4);
    }

    #[test]
    fn test_merge_lower_heartbeat_discarded() {
        let mut table = MembershipTable::new();
        table.merge(id(7), 4, 1);

        assert_eq!(table.merge(id(7), 2, 9), MergeOutcome::Stale);
        let entry = table.get(&id(7)).unwrap();
        assert_eq!(entry.heartbeat, 4);
        assert_eq!(entry.last_update, 1);
    }

    #[test]
    fn test_merge_equal_heartbeat_keeps_timestamp() {
        let mut table = MembershipTable::new();
        table.merge(id(2), 5, 1);
        assert_eq!(table.merge(id(2), 5, 8), MergeOutcome::Stale);
        assert_eq!(table.get(&id(2)).unwrap().last_update, 1);
    }

    #[test]
    fn test_merge_higher_heartbeat_raises() {
        let mut table = MembershipTable::new();
        table.merge(id(2), 5, 1);
        assert_eq!(table.merge(id(2), 6, 8), MergeOutcome::Raised);

        let entry = table.get(&id(2)).unwrap();
        assert_eq!(entry.heartbeat, 6);
        assert_eq!(entry.last_update, 8);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let observations = [(id(1), 3), (id(2), 9), (id(1), 7), (id(2), 4), (id(1), 7)];

        let mut forward = MembershipTable::new();
        for (peer, hb) in observations {
            forward.merge(peer, hb, 0);
        }

        let mut backward = MembershipTable::new();
        for (peer, hb) in observations.iter().rev().chain(observations.iter()) {
            backward.merge(*peer, *hb, 0);
        }

        assert_eq!(forward.heartbeats(), backward.heartbeats());
        assert_eq!(forward.get(&id(1)).unwrap().heartbeat, 7);
        assert_eq!(forward.get(&id(2)).unwrap().heartbeat, 9);
    }

    #[test]
    fn test_refresh_only_touches_existing() {
        let mut table = MembershipTable::new();
        assert!(!table.refresh(&id(1), 3, 3));
        assert!(table.is_empty());

        table.merge(id(1), 10, 0);
        assert!(table.refresh(&id(1), 4, 5));
        let entry = table.get(&id(1)).unwrap();
        assert_eq!(entry.heartbeat, 10);
        assert_eq!(entry.last_update, 5);
    }

    #[test]
    fn test_stale_ids_boundary_is_exclusive() {
        let mut table = MembershipTable::new();
        table.merge(id(1), 1, 10);
        table.merge(id(2), 1, 11);

        assert_eq!(table.stale_ids(31, 20), vec![id(1)]);
        assert!(table.stale_ids(30, 20).is_empty());
    }

    #[test]
    fn test_tombstone_suppresses_stale_revival() {
        let mut table = MembershipTable::with_tombstones(10);
        table.merge(id(4), 6, 0);
        table.remove(&id(4), 25);

        assert_eq!(table.merge(id(4), 6, 26), MergeOutcome::Suppressed);
        assert!(!table.contains(&id(4)));

        assert_eq!(table.merge(id(4), 7, 27), MergeOutcome::Inserted);
        assert_eq!(table.tombstone_count(), 0);
    }

    #[test]
    fn test_tombstone_expires() {
        let mut table = MembershipTable::with_tombstones(5);
        table.merge(id(4), 6, 0);
        table.remove(&id(4), 10);

        table.purge_tombstones(16);
        assert_eq!(table.tombstone_count(), 0);
        assert_eq!(table.merge(id(4), 6, 16), MergeOutcome::Inserted);
    }

    #[test]
    fn test_admit_clears_tombstone() {
        let mut table = MembershipTable::with_tombstones(50);
        table.merge(id(9), 30, 0);
        table.remove(&id(9), 21);

        assert!(table.admit(id(9), 0, 22));
        assert_eq!(table.get(&id(9)).unwrap().heartbeat, 0);
    }

    #[test]
    fn test_without_tombstones_removed_ids_return() {
        let mut table = MembershipTable::new();
        table.merge(id(4), 6, 0);
        table.remove(&id(4), 25);
        assert_eq!(table.merge(id(4), 6, 26), MergeOutcome::Inserted);
    }

    #[test]
    fn test_sample_with_replacement() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut table = MembershipTable::new();
        assert!(table.sample_with_replacement(&mut rng, 3).is_empty());

        table.merge(id(1), 0, 0);
        let picks = table.sample_with_replacement(&mut rng, 3);
        assert_eq!(picks, vec![id(1), id(1), id(1)]);

        table.merge(id(2), 0, 0);
        table.merge(id(3), 0, 0);
        let picks = table.sample_with_replacement(&mut rng, 3);
        assert_eq!(picks.len(), 3);
        assert!(picks.iter().all(|p| table.contains(p)));
    }
}
