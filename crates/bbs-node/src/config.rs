//! Configuration loading from TOML and environment variables.
//!
//! The node reads its configuration from:
//! 1. A TOML config file (default: config/bbs.toml)
//! 2. Environment variables (override TOML values)
//!
//! Environment variable prefix: BBS_

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use bbs_protocol::crypto;
use bbs_protocol::{PubKey, SecretKey};
use serde::{Deserialize, Serialize};

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Boards hosted from startup.
    #[serde(default)]
    pub boards: Vec<BoardConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "bbs_state=debug").
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Sync driver and request timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between passes of the background sync driver.
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,
    /// Seconds an asynchronous request waits for its response.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// RPC listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// One hosted board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub public_key: PubKey,
    /// Required for master boards.
    #[serde(default)]
    pub secret_key: Option<SecretKey>,
    #[serde(default)]
    pub master: bool,
    /// Name given to the board if a master has to create it.
    #[serde(default = "default_board_name")]
    pub name: String,
    #[serde(default)]
    pub body: String,
}

// -- Defaults --

fn default_log_level() -> String {
    "info".to_string()
}
fn default_sync_interval() -> u64 {
    bbs_protocol::DEFAULT_SYNC_INTERVAL_SECS
}
fn default_request_timeout() -> u64 {
    bbs_protocol::DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_rpc_addr() -> String {
    bbs_protocol::DEFAULT_RPC_BIND_ADDR.to_string()
}
fn default_max_connections() -> usize {
    bbs_protocol::DEFAULT_RPC_MAX_CONNECTIONS
}
fn default_board_name() -> String {
    "general".to_string()
}

// -- Trait impls --

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_rpc_addr(),
            max_connections: default_max_connections(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, anyhow::Error> {
        let config: NodeConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, with environment variable
    /// overrides, then validate it.
    pub fn load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not found, using defaults"
                );
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BBS_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("BBS_SYNC_INTERVAL") {
            if let Ok(secs) = val.parse() {
                self.sync.interval_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("BBS_REQUEST_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                self.sync.request_timeout_secs = secs;
            }
        }
        if let Ok(val) = std::env::var("BBS_RPC_BIND_ADDR") {
            self.rpc.bind_addr = val;
        }
    }

    /// Reject board entries a node could never host.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.sync.interval_secs == 0 {
            bail!("sync.interval_secs must be positive");
        }
        for board in &self.boards {
            match (&board.secret_key, board.master) {
                (None, true) => bail!("master board {} has no secret_key", board.public_key),
                (Some(sk), _) if crypto::public_key_of(sk) != board.public_key => {
                    bail!("secret_key does not belong to board {}", board.public_key)
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Parse the RPC bind address into a SocketAddr.
    pub fn rpc_socket_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.rpc.bind_addr.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = NodeConfig::from_toml("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sync.interval(), Duration::from_secs(5));
        assert_eq!(config.sync.request_timeout(), Duration::from_secs(30));
        assert!(config.boards.is_empty());
        assert!(config.rpc_socket_addr().is_ok());
    }

    #[test]
    fn test_board_entries() {
        let (pk, sk) = crypto::generate_keypair();
        let raw = format!(
            r#"
            [sync]
            interval_secs = 2

            [[boards]]
            public_key = "{}"
            secret_key = "{}"
            master = true
            name = "news"
            "#,
            pk.to_hex(),
            sk.to_hex()
        );
        let config = NodeConfig::from_toml(&raw).unwrap();
        assert_eq!(config.sync.interval_secs, 2);
        assert_eq!(config.sync.request_timeout_secs, 30);
        assert_eq!(config.boards[0].public_key, pk);
        assert_eq!(config.boards[0].name, "news");
        config.validate().unwrap();
    }

    #[test]
    fn test_master_without_key_rejected() {
        let (pk, _) = crypto::generate_keypair();
        let mut config = NodeConfig::default();
        config.boards.push(BoardConfig {
            public_key: pk,
            secret_key: None,
            master: true,
            name: default_board_name(),
            body: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mismatched_key_rejected() {
        let (pk, _) = crypto::generate_keypair();
        let (_, other) = crypto::generate_keypair();
        let mut config = NodeConfig::default();
        config.boards.push(BoardConfig {
            public_key: pk,
            secret_key: Some(other),
            master: false,
            name: default_board_name(),
            body: String::new(),
        });
        assert!(config.validate().is_err());
    }
}
