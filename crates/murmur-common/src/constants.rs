//! Shared constants for Murmur components.

/// Ticks without a heartbeat increase before an entry is evicted
pub const DEFAULT_REMOVE_THRESHOLD: u64 = 20;

/// Peers gossiped to per tick
pub const DEFAULT_FANOUT: usize = 3;

/// Staleness after which an entry is reported as suspected (never evicts)
pub const DEFAULT_FAIL_THRESHOLD: u64 = 5;

/// Wall-clock length of one protocol tick for the UDP daemon (milliseconds)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Default UDP bind address for `murmur run`
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7000";

/// Default introducer address; a node bound here originates the group
pub const DEFAULT_BOOTSTRAP_ADDR: &str = "127.0.0.1:7000";

/// Largest datagram the UDP transport will accept
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Wire format layout
pub mod wire {
    /// Discriminant tag: join request
    pub const TAG_JOIN_REQUEST: u8 = 0;

    /// Discriminant tag: join reply
    pub const TAG_JOIN_REPLY: u8 = 1;

    /// Discriminant tag: gossip
    pub const TAG_GOSSIP: u8 = 2;

    /// Encoded node identity: 4-byte IPv4 address + 2-byte port
    pub const IDENTITY_LEN: usize = 6;

    /// Encoded heartbeat counter
    pub const HEARTBEAT_LEN: usize = 8;

    /// Encoded gossip entry count
    pub const COUNT_LEN: usize = 8;

    /// One gossip record: identity + heartbeat
    pub const ENTRY_LEN: usize = IDENTITY_LEN + HEARTBEAT_LEN;
}
