use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    /// Search base for the sync pass, recorded in run metadata.
    pub base_dn: String,
    /// JSON export of raw directory entries consumed by the snapshot source.
    pub snapshot: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Deadline for the bind operation, in seconds.
    #[serde(default = "default_bind_timeout_secs")]
    pub bind_timeout_secs: u64,
    /// Deadline for the full snapshot fetch, in seconds.
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

fn default_page_size() -> usize {
    500
}
fn default_bind_timeout_secs() -> u64 {
    10
}
fn default_operation_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Directory for per-run sync log files. No logs written when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { log_dir: None }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Static bearer token required on every API route.
    pub auth_token: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.directory.base_dn.trim().is_empty() {
        anyhow::bail!("directory.base_dn must not be empty");
    }

    if config.directory.page_size == 0 {
        anyhow::bail!("directory.page_size must be > 0");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.server.auth_token.trim().is_empty() {
        anyhow::bail!("server.auth_token must not be empty");
    }

    Ok(config)
}
