use anyhow::{Context, Result};
use nostr_bunker::{ConnectionConfig, MAX_AUTHORIZED_CLIENTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon tuning, stored as `config.json` in the data directory.
///
/// Keys, relay and authorized clients live in the signer's own store instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ping_interval_ms: u64,
    pub connection_timeout_ms: u64,
    pub reconnect_base_ms: u64,
    pub max_reconnect_attempts: u32,
    pub max_authorized_clients: usize,
    /// How often the loop runs timers when no frames arrive.
    pub poll_interval_ms: u64,

    #[serde(skip)]
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            ping_interval_ms: connection.ping_interval_ms,
            connection_timeout_ms: connection.connection_timeout_ms,
            reconnect_base_ms: connection.reconnect_base_ms,
            max_reconnect_attempts: connection.max_reconnect_attempts,
            max_authorized_clients: MAX_AUTHORIZED_CLIENTS,
            poll_interval_ms: 250,
            path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Load config from the data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            config.path = config_path;
            Ok(config)
        } else {
            Ok(Config {
                path: config_path,
                ..Default::default()
            })
        }
    }

    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&self.path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            ping_interval_ms: self.ping_interval_ms,
            connection_timeout_ms: self.connection_timeout_ms,
            reconnect_base_ms: self.reconnect_base_ms,
            max_reconnect_attempts: self.max_reconnect_attempts,
            ..ConnectionConfig::default()
        }
    }
}
