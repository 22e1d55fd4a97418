//! Membership state.
//!
//! Implements:
//! - Membership table (per-key max merge over heartbeats)
//! - Optional tombstones for recently evicted peers

mod table;

pub use table::{MembershipTable, MergeOutcome};
