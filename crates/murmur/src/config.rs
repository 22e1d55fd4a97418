//! Configuration management for Murmur.

use anyhow::{Context, Result};
use murmur_common::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_BOOTSTRAP_ADDR, DEFAULT_FAIL_THRESHOLD, DEFAULT_FANOUT,
    DEFAULT_REMOVE_THRESHOLD, DEFAULT_TICK_INTERVAL_MS,
};
use murmur_common::{MurmurError, NodeIdentity};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MurmurConfig {
    /// This node's identity (UDP bind address)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Well-known introducer address
    #[serde(default = "default_bootstrap_addr")]
    pub bootstrap_addr: String,

    /// Protocol tuning
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// Protocol constants
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    /// Ticks without a heartbeat increase before eviction
    #[serde(default = "default_remove_threshold")]
    pub remove_threshold: u64,

    /// Peers gossiped to per tick
    #[serde(default = "default_fanout")]
    pub fanout: usize,

    /// Staleness reported as suspected; never evicts
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u64,

    /// Wall-clock tick length for the UDP daemon
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Ticks an evicted id is shielded from stale gossip (0 = off)
    #[serde(default)]
    pub tombstone_ticks: u64,

    /// Re-send JoinRequest while awaiting a reply (absent = wait forever)
    #[serde(default)]
    pub join_retry: Option<JoinRetryConfig>,
}

/// Join retry policy
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct JoinRetryConfig {
    /// Ticks between JoinRequest sends
    pub interval_ticks: u64,
    /// Total sends before giving up
    pub max_attempts: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            remove_threshold: default_remove_threshold(),
            fanout: default_fanout(),
            fail_threshold: default_fail_threshold(),
            tick_interval_ms: default_tick_interval_ms(),
            tombstone_ticks: 0,
            join_retry: None,
        }
    }
}

impl ProtocolConfig {
    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> Result<(), MurmurError> {
        if self.fanout == 0 {
            return Err(MurmurError::Config("fanout must be at least 1".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(MurmurError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if let Some(retry) = self.join_retry {
            if retry.interval_ticks == 0 || retry.max_attempts == 0 {
                return Err(MurmurError::Config(
                    "join_retry needs positive interval_ticks and max_attempts".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_bind_addr() -> String { DEFAULT_BIND_ADDR.to_string() }
fn default_bootstrap_addr() -> String { DEFAULT_BOOTSTRAP_ADDR.to_string() }
fn default_remove_threshold() -> u64 { DEFAULT_REMOVE_THRESHOLD }
fn default_fanout() -> usize { DEFAULT_FANOUT }
fn default_fail_threshold() -> u64 { DEFAULT_FAIL_THRESHOLD }
fn default_tick_interval_ms() -> u64 { DEFAULT_TICK_INTERVAL_MS }

impl MurmurConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(config_path: &str) -> Result<Self> {
        let config: Self = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Self::default()
        };

        config.protocol.validate()?;
        Ok(config)
    }

    pub fn bind_identity(&self) -> Result<NodeIdentity> {
        self.bind_addr
            .parse()
            .context("Invalid bind address")
    }

    pub fn bootstrap_identity(&self) -> Result<NodeIdentity> {
        self.bootstrap_addr
            .parse()
            .context("Invalid bootstrap address")
    }
}

impl Default for MurmurConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            bootstrap_addr: default_bootstrap_addr(),
            protocol: ProtocolConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MurmurConfig::default();
        assert_eq!(config.protocol.remove_threshold, 20);
        assert_eq!(config.protocol.fanout, 3);
        assert_eq!(config.protocol.fail_threshold, 5);
        assert!(config.protocol.join_retry.is_none());
        assert_eq!(config.bind_identity().unwrap().port, 7000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = MurmurConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.protocol, ProtocolConfig::default());
    }

    #[test]
    fn test_load_toml_file() {
        let path = std::env::temp_dir().join(format!("murmur-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
bind_addr = "127.0.0.1:7100"

[protocol]
remove_threshold = 30
fanout = 2

[protocol.join_retry]
interval_ticks = 10
max_attempts = 4
"#,
        )
        .unwrap();

        let config = MurmurConfig::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.bind_addr, "127.0.0.1:7100");
        assert_eq!(config.bootstrap_addr, DEFAULT_BOOTSTRAP_ADDR);
        assert_eq!(config.protocol.remove_threshold, 30);
        assert_eq!(config.protocol.fanout, 2);
        assert_eq!(config.protocol.fail_threshold, 5);
        assert_eq!(
            config.protocol.join_retry,
            Some(JoinRetryConfig {
                interval_ticks: 10,
                max_attempts: 4
            })
        );
    }

    #[test]
    fn test_validate_rejects_zero_fanout() {
        let protocol = ProtocolConfig {
            fanout: 0,
            ..Default::default()
        };
        assert!(protocol.validate().is_err());
    }
}
