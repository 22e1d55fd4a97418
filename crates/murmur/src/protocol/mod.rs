//! Wire protocol.
//!
//! Three message kinds share one fixed header byte:
//! - JoinRequest (sender identity + heartbeat)
//! - JoinReply (empty)
//! - Gossip (entry count + fixed-size records)

mod codec;

pub use codec::{GossipRecord, Message};
