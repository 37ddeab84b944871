use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::debug;

use super::ServiceConfig;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
pub const HOST: &str = "FRAUD_STREAM_HOST";
pub const PORT: &str = "FRAUD_STREAM_PORT";
pub const MODEL_PATH: &str = "FRAUD_MODEL_PATH";
pub const CONFIG_PATH: &str = "CONFIG_PATH";

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Config file location: `CONFIG_PATH` or `config.toml`.
pub fn config_path() -> PathBuf {
    non_empty(CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Apply environment overrides on top of file configuration.
pub fn apply_env_overrides(config: &mut ServiceConfig) -> Result<()> {
    if let Some(url) = non_empty(DATABASE_URL) {
        debug!("storage.database_url overridden from environment");
        config.storage.database_url = url;
    }

    if let Some(url) = non_empty(ETH_RPC_URL) {
        debug!("feed.rpc_url overridden from environment");
        config.feed.rpc_url = url;
    }

    if let Some(host) = non_empty(HOST) {
        config.server.host = host;
    }

    if let Some(port) = non_empty(PORT) {
        config.server.port = port
            .parse()
            .with_context(|| format!("{} is not a valid port: {}", PORT, port))?;
    }

    // an explicit model path is tried before the configured candidates
    if let Some(path) = non_empty(MODEL_PATH) {
        config.detection.artifact_paths.insert(0, PathBuf::from(path));
    }

    Ok(())
}
