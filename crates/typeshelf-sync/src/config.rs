//! # Client Configuration
//!
//! Configuration management for the sync core.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TYPESHELF_CONNECTION_RETRY_SECS=5                                  │
//! │     TYPESHELF_DOWNLOAD_PARALLELISM=4                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/typeshelf/client.toml (Linux)                            │
//! │     ~/Library/Application Support/com.typeshelf.client/client.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     10s retry intervals, 3 parallel downloads, 60s download timeout    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # client.toml
//! [connection]
//! authentication_retry_interval_secs = 10
//! connection_retry_interval_secs = 10
//! catalog_topic = "catalog"
//! resync_after_reconnect = true
//!
//! [storage]
//! download_parallelism = 3
//! download_timeout_secs = 60
//! font_directory = "/var/tmp/typeshelf"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connection Settings
// =============================================================================

/// Connection state machine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Spacing between caller-driven sign-in attempts (seconds).
    #[serde(default = "default_retry_interval")]
    pub authentication_retry_interval_secs: u64,

    /// Interval between transport re-open attempts while reconnecting (seconds).
    #[serde(default = "default_retry_interval")]
    pub connection_retry_interval_secs: u64,

    /// Topic of the shared catalog channel.
    #[serde(default = "default_catalog_topic")]
    pub catalog_topic: String,

    /// Refresh the catalog after the transport comes back.
    #[serde(default = "default_true")]
    pub resync_after_reconnect: bool,
}

fn default_retry_interval() -> u64 {
    10
}

fn default_catalog_topic() -> String {
    "catalog".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ConnectionSettings {
            authentication_retry_interval_secs: default_retry_interval(),
            connection_retry_interval_secs: default_retry_interval(),
            catalog_topic: default_catalog_topic(),
            resync_after_reconnect: true,
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Reconciliation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Maximum installer calls in flight.
    #[serde(default = "default_download_parallelism")]
    pub download_parallelism: usize,

    /// Upper bound for fetching one font's bytes (seconds).
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// Directory for user-scope font files. System temp dir when unset.
    #[serde(default)]
    pub font_directory: Option<PathBuf>,
}

fn default_download_parallelism() -> usize {
    3
}

fn default_download_timeout() -> u64 {
    60
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            download_parallelism: default_download_parallelism(),
            download_timeout_secs: default_download_timeout(),
            font_directory: None,
        }
    }
}

// =============================================================================
// Main Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl ClientConfig {
    /// Creates a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (client.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.connection.authentication_retry_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "authentication_retry_interval_secs must be greater than 0".into(),
            ));
        }

        if self.connection.connection_retry_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "connection_retry_interval_secs must be greater than 0".into(),
            ));
        }

        if self.connection.catalog_topic.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "catalog_topic must not be empty".into(),
            ));
        }

        if self.storage.download_parallelism == 0 {
            return Err(SyncError::InvalidConfig(
                "download_parallelism must be greater than 0".into(),
            ));
        }

        if self.storage.download_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "download_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("TYPESHELF_AUTHENTICATION_RETRY_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.connection.authentication_retry_interval_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("TYPESHELF_CONNECTION_RETRY_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                debug!(secs = s, "Overriding connection retry interval from environment");
                self.connection.connection_retry_interval_secs = s;
            }
        }

        if let Ok(topic) = std::env::var("TYPESHELF_CATALOG_TOPIC") {
            debug!(topic = %topic, "Overriding catalog topic from environment");
            self.connection.catalog_topic = topic;
        }

        if let Ok(flag) = std::env::var("TYPESHELF_RESYNC_AFTER_RECONNECT") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.connection.resync_after_reconnect = true,
                "0" | "false" | "no" => self.connection.resync_after_reconnect = false,
                _ => warn!(value = %flag, "Unknown resync flag in environment"),
            }
        }

        if let Ok(n) = std::env::var("TYPESHELF_DOWNLOAD_PARALLELISM") {
            if let Ok(p) = n.parse::<usize>() {
                debug!(parallelism = p, "Overriding download parallelism from environment");
                self.storage.download_parallelism = p;
            }
        }

        if let Ok(secs) = std::env::var("TYPESHELF_DOWNLOAD_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.storage.download_timeout_secs = s;
            }
        }

        if let Ok(dir) = std::env::var("TYPESHELF_FONT_DIRECTORY") {
            self.storage.font_directory = Some(PathBuf::from(dir));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "typeshelf", "client")
            .map(|dirs| dirs.config_dir().join("client.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn authentication_retry_interval(&self) -> Duration {
        Duration::from_secs(self.connection.authentication_retry_interval_secs)
    }

    pub fn connection_retry_interval(&self) -> Duration {
        Duration::from_secs(self.connection.connection_retry_interval_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.download_timeout_secs)
    }

    /// Directory for user-scope font files.
    pub fn font_directory(&self) -> PathBuf {
        self.storage
            .font_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.authentication_retry_interval(), Duration::from_secs(10));
        assert_eq!(config.connection_retry_interval(), Duration::from_secs(10));
        assert_eq!(config.connection.catalog_topic, "catalog");
        assert!(config.connection.resync_after_reconnect);
        assert_eq!(config.storage.download_parallelism, 3);
        assert_eq!(config.download_timeout(), Duration::from_secs(60));
        assert_eq!(config.font_directory(), std::env::temp_dir());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ClientConfig::default();
        assert!(config.validate().is_ok());

        config.storage.download_parallelism = 0;
        assert!(config.validate().is_err());

        config.storage.download_parallelism = 2;
        config.connection.catalog_topic = "  ".into();
        assert!(config.validate().is_err());

        config.connection.catalog_topic = "catalog".into();
        config.connection.connection_retry_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [storage]
            download_parallelism = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.download_parallelism, 5);
        assert_eq!(config.storage.download_timeout_secs, 60);
        assert_eq!(config.connection.connection_retry_interval_secs, 10);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("typeshelf-config-{}", uuid::Uuid::new_v4()))
            .join("client.toml");

        let mut config = ClientConfig::default();
        config.connection.catalog_topic = "catalog:beta".into();
        config.save(Some(path.clone())).unwrap();

        let loaded = ClientConfig::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.connection.catalog_topic, "catalog:beta");

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn test_toml_serialization() {
        let config = ClientConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[connection]"));
        assert!(toml_str.contains("[storage]"));
    }
}
