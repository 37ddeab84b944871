//! Service configuration
//!
//! Loaded from TOML, then overridden from the environment (see [`env_config`]).

pub mod env_config;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::anomaly_detection::DetectionConfig;
use crate::api::server_config;

/// Streaming server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,

    /// Session capacity
    #[serde(default = "ServerConfig::default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "ServerConfig::default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Pong deadline; also bounds each outbound send
    #[serde(default = "ServerConfig::default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// Largest inbound message in bytes
    #[serde(default = "ServerConfig::default_max_message_size")]
    pub max_message_size: usize,
}

impl ServerConfig {
    fn default_host() -> String { "127.0.0.1".to_string() }
    fn default_port() -> u16 { server_config::DEFAULT_PORT }
    fn default_max_connections() -> usize { server_config::MAX_CONNECTIONS }
    fn default_heartbeat_interval() -> u64 { server_config::HEARTBEAT_INTERVAL.as_secs() }
    fn default_heartbeat_timeout() -> u64 { server_config::HEARTBEAT_TIMEOUT.as_secs() }
    fn default_max_message_size() -> usize { server_config::MAX_MESSAGE_SIZE }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            max_connections: Self::default_max_connections(),
            heartbeat_interval_secs: Self::default_heartbeat_interval(),
            heartbeat_timeout_secs: Self::default_heartbeat_timeout(),
            max_message_size: Self::default_max_message_size(),
        }
    }
}

/// Chain feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Ethereum JSON-RPC endpoint
    #[serde(default = "FeedConfig::default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "FeedConfig::default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "FeedConfig::default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl FeedConfig {
    fn default_rpc_url() -> String { "http://127.0.0.1:8545".to_string() }
    fn default_poll_interval() -> u64 { 100 }
    fn default_request_timeout() -> u64 { 10 }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            rpc_url: Self::default_rpc_url(),
            poll_interval_ms: Self::default_poll_interval(),
            request_timeout_secs: Self::default_request_timeout(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_database_url")]
    pub database_url: String,
}

impl StorageConfig {
    fn default_database_url() -> String { "sqlite://./data/transactions.db?mode=rwc".to_string() }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { database_url: Self::default_database_url() }
    }
}

/// Monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Emit aggregate statistics every this many processed transactions
    #[serde(default = "MonitorConfig::default_stats_every")]
    pub stats_every: u64,
}

impl MonitorConfig {
    fn default_stats_every() -> u64 { 100 }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { stats_every: Self::default_stats_every() }
    }
}

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl ServiceConfig {
    /// Parse a TOML file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: ServiceConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// File, then environment overrides, then validation.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        env_config::apply_env_overrides(&mut config)?;
        config.validate().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.max_connections == 0 {
            return Err("server.max_connections must be > 0".to_string());
        }

        if self.server.heartbeat_interval_secs == 0 || self.server.heartbeat_timeout_secs == 0 {
            return Err("server heartbeat interval and timeout must be > 0".to_string());
        }

        if self.feed.poll_interval_ms == 0 {
            return Err("feed.poll_interval_ms must be > 0".to_string());
        }

        if self.feed.rpc_url.trim().is_empty() {
            return Err("feed.rpc_url must not be empty".to_string());
        }

        if self.monitor.stats_every == 0 {
            return Err("monitor.stats_every must be > 0".to_string());
        }

        self.detection.validate()
    }
}
