//! Common error types for Murmur components.

use thiserror::Error;

/// Errors raised by the membership protocol and its collaborators
#[derive(Debug, Error)]
pub enum MurmurError {
    /// Truncated, oversized, or otherwise undecodable message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Discriminant tag that names no known message kind
    #[error("Unknown message kind: {0}")]
    UnknownMessageKind(u8),

    /// Send failure (destination unreachable, socket error)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Join attempts exhausted without a reply
    #[error("Join failed: {0}")]
    JoinFailed(String),
}

impl MurmurError {
    /// Returns true if the offending message should simply be dropped
    pub fn is_discardable(&self) -> bool {
        matches!(self, Self::MalformedMessage(_) | Self::UnknownMessageKind(_))
    }

    /// Returns true if the protocol treats this like silent packet loss
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MurmurError::MalformedMessage("short".into()).is_discardable());
        assert!(MurmurError::UnknownMessageKind(9).is_discardable());
        assert!(!MurmurError::Transport("down".into()).is_discardable());
        assert!(MurmurError::Transport("down".into()).is_transient());
        assert!(!MurmurError::JoinFailed("no reply".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = MurmurError::UnknownMessageKind(7);
        assert_eq!(err.to_string(), "Unknown message kind: 7");
    }
}
