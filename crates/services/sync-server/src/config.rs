//! Configuration for the sync server
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

use watchsync_core::model::{MAX_POLL_INTERVAL, PLAY_START_SLACK};

use crate::reconcile::ReconcileConfig;

/// Main configuration for the sync server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Synchronization tunables
    #[serde(default)]
    pub sync: SyncConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_http_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            host: default_host(),
        }
    }
}

/// Synchronization tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Viewers silent for this many seconds are pruned
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval: f64,

    /// Seconds of slack added before synchronized playback starts
    #[serde(default = "default_play_start_slack")]
    pub play_start_slack: f64,
}

fn default_max_poll_interval() -> f64 {
    MAX_POLL_INTERVAL
}

fn default_play_start_slack() -> f64 {
    PLAY_START_SLACK
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_poll_interval: default_max_poll_interval(),
            play_start_slack: default_play_start_slack(),
        }
    }
}

impl SyncConfig {
    /// The reconciliation view of this configuration
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            max_poll_interval: self.max_poll_interval,
            play_start_slack: self.play_start_slack,
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per session under `data_dir`
    File,
    /// In-memory only (sessions lost on restart)
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to use
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Directory holding session files (file backend only)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_data_dir() -> String {
    "./sessions".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(port) = std::env::var("SYNC_HTTP_PORT") {
            if let Ok(p) = port.parse() {
                config.server.http_port = p;
            }
        }
        if let Ok(host) = std::env::var("SYNC_HOST") {
            config.server.host = host;
        }

        if let Ok(interval) = std::env::var("SYNC_MAX_POLL_INTERVAL") {
            if let Ok(i) = interval.parse() {
                config.sync.max_poll_interval = i;
            }
        }
        if let Ok(slack) = std::env::var("SYNC_PLAY_START_SLACK") {
            if let Ok(s) = slack.parse() {
                config.sync.play_start_slack = s;
            }
        }

        if let Ok(backend) = std::env::var("SYNC_STORAGE") {
            match backend.as_str() {
                "memory" => config.storage.backend = StorageBackend::Memory,
                "file" => config.storage.backend = StorageBackend::File,
                other => tracing::warn!("Unknown SYNC_STORAGE value: {}", other),
            }
        }
        if let Ok(dir) = std::env::var("SYNC_DATA_DIR") {
            config.storage.data_dir = dir;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if p.as_ref().exists() {
                return Self::from_file(p);
            }
        }
        Ok(Self::from_env())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.sync.max_poll_interval, 5.0);
        assert_eq!(config.sync.play_start_slack, 1.0);
        assert_eq!(config.storage.backend, StorageBackend::File);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[server]
http_port = 9090

[sync]
max_poll_interval = 10.0
play_start_slack = 0.5

[storage]
backend = "memory"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.http_port, 9090);
        assert_eq!(config.sync.max_poll_interval, 10.0);
        assert_eq!(config.sync.play_start_slack, 0.5);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }
}
