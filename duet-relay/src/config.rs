//! Configuration loading for duet-relay.
//!
//! Configuration is loaded from a TOML file (default: `duet.toml`). Every
//! section and field is optional and falls back to the defaults below.

use duet_core::Keys;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration for duet-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP transport configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// User directory configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Matcher configuration.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Reply-keyboard labels.
    #[serde(default)]
    pub keys: Keys,
    /// Outbound queue configuration.
    #[serde(default)]
    pub outbox: OutboxConfig,
    /// Cleanup task configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_http_bind")]
    pub bind_address: String,
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Which directory backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process-local; records are lost on restart.
    Memory,
    /// SQLite file; records survive restarts.
    Sqlite,
}

/// User directory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend (default: sqlite).
    #[serde(default = "default_backend")]
    pub backend: Backend,
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// SQLite pool size (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Matcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Candidate searches per seek before settling for "waiting"
    /// (default: 3). A search is repeated only when the bind lost a race.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Outbound queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Messages kept per user before the oldest is dropped (default: 100).
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Cleanup interval in seconds (default: 60).
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Undelivered outbound messages older than this are dropped
    /// (default: 3600 = 1 hour).
    #[serde(default = "default_outbox_ttl")]
    pub outbox_ttl_secs: u64,
    /// Enable cleanup task (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_http_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_backend() -> Backend {
    Backend::Sqlite
}

fn default_database_path() -> PathBuf {
    PathBuf::from("duet.db")
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_queued() -> usize {
    100
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_outbox_ttl() -> u64 {
    3600 // 1 hour
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_queued: default_max_queued(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            outbox_ttl_secs: default_outbox_ttl(),
            enabled: default_cleanup_enabled(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.matching.max_attempts == 0 {
            return Err(ConfigError::Invalid("matching.max_attempts must be > 0".into()));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::Invalid("storage.max_connections must be > 0".into()));
        }
        if self.outbox.max_queued == 0 {
            return Err(ConfigError::Invalid("outbox.max_queued must be > 0".into()));
        }
        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(ConfigError::Invalid("cleanup.interval_secs must be > 0".into()));
        }
        let keys = &self.keys;
        if keys.random_connect.trim().is_empty() || keys.exit.trim().is_empty() {
            return Err(ConfigError::Invalid("key labels must not be empty".into()));
        }
        if keys.random_connect == keys.exit {
            return Err(ConfigError::Invalid(
                "keys.random_connect and keys.exit must differ".into(),
            ));
        }
        if keys.random_connect.starts_with('/') || keys.exit.starts_with('/') {
            return Err(ConfigError::Invalid("key labels must not look like commands".into()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
