//! # Murmur Common
//!
//! Shared types, errors, and constants used across Murmur components.
//!
//! ## Modules
//! - `types` - Core data structures (NodeIdentity, MembershipEntry, JoinState)
//! - `error` - Protocol error kinds
//! - `constants` - Protocol defaults and wire tags

pub mod constants;
pub mod error;
pub mod types;

pub use error::MurmurError;
pub use types::*;
