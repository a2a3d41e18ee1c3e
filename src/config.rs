use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence across restarts)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./relay.db")
}

/// Webhook target for offline/online transition notifications
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NotifierConfig {
    pub url: String,
    /// Optional user/channel id to mention in the message
    pub mention: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Shared secret producers must send as their first frame
    pub secret: String,

    /// Bind address for the HTTP/WebSocket server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Maximum number of distinct hosts the store will accept
    #[serde(default = "default_max_hosts")]
    pub max_hosts: usize,

    /// Seconds between liveness sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Snapshot age (seconds) beyond which a host is considered offline
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,

    /// Age (seconds) beyond which a persisted snapshot is dropped at restore
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Notification webhook (optional - transitions are logged only if unset)
    pub notifier: Option<NotifierConfig>,
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_max_hosts() -> usize {
    64
}

fn default_sweep_interval_secs() -> u64 {
    20
}

fn default_stale_after_secs() -> i64 {
    60
}

fn default_retention_secs() -> i64 {
    300
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{ "secret": "hunter2" }"#).unwrap();

        assert_eq!(config.secret, "hunter2");
        assert_eq!(config.max_hosts, 64);
        assert_eq!(config.sweep_interval_secs, 20);
        assert_eq!(config.stale_after_secs, 60);
        assert_eq!(config.retention_secs, 300);
        assert!(config.storage.is_none());
        assert!(config.notifier.is_none());
    }

    #[test]
    fn storage_backend_is_tagged() {
        let config: Config = serde_json::from_str(
            r#"{
                "secret": "s",
                "storage": { "backend": "sqlite", "path": "/tmp/relay.db" },
                "notifier": { "url": "https://example.com/hook", "mention": "ops" }
            }"#,
        )
        .unwrap();

        match config.storage {
            Some(StorageConfig::Sqlite { path }) => {
                assert_eq!(path, PathBuf::from("/tmp/relay.db"))
            }
            other => panic!("unexpected storage config: {other:?}"),
        }
        assert_eq!(config.notifier.unwrap().mention.as_deref(), Some("ops"));
    }
}
