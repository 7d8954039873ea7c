//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::storage::SqliteConfig;
use crate::table::{PartitionScheme, RetentionPolicy, DEFAULT_PARTITION_DURATION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub partition: PartitionConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("kubetrail").to_string_lossy().to_string())
        .unwrap_or_else(|| "./kubetrail_data".to_string())
}

fn default_pool_size() -> usize {
    8
}

fn default_busy_timeout() -> u64 {
    5000 // 5 seconds
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl StorageConfig {
    /// Settings for the SQLite engine
    pub fn sqlite(&self) -> SqliteConfig {
        let mut config = SqliteConfig::new(expand_home(&self.data_dir));
        config.pool_size = self.pool_size.max(1);
        config.busy_timeout = Duration::from_millis(self.busy_timeout_ms);
        config
    }
}

/// Partition layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartitionConfig {
    /// Width of one partition in minutes
    #[serde(default = "default_partition_minutes")]
    pub duration_minutes: u64,
}

fn default_partition_minutes() -> u64 {
    DEFAULT_PARTITION_DURATION.as_secs() / 60
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_partition_minutes(),
        }
    }
}

impl PartitionConfig {
    pub fn scheme(&self) -> PartitionScheme {
        let minutes = self.duration_minutes.max(1);
        PartitionScheme::new(Duration::from_secs(minutes.saturating_mul(60)))
    }
}

/// How much history to keep; unset limits keep everything
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetentionConfig {
    pub max_age_hours: Option<u64>,

    pub max_partitions: Option<usize>,
}

impl RetentionConfig {
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age: self.max_age_hours.map(|h| Duration::from_secs(h.saturating_mul(3600))),
            max_partitions: self.max_partitions,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("kubetrail").join("config.toml")),
            Some(PathBuf::from("/etc/kubetrail/config.toml")),
            Some(PathBuf::from("./kubetrail.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `KUBETRAIL_*` overrides looked up through `lookup`
    ///
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_dir) = lookup("KUBETRAIL_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }

        if let Some(minutes) = lookup("KUBETRAIL_PARTITION_MINUTES") {
            match minutes.parse() {
                Ok(m) => self.partition.duration_minutes = m,
                Err(_) => {
                    tracing::warn!("Ignoring invalid KUBETRAIL_PARTITION_MINUTES: {}", minutes)
                }
            }
        }

        if let Some(hours) = lookup("KUBETRAIL_MAX_AGE_HOURS") {
            match hours.parse() {
                Ok(h) => self.retention.max_age_hours = Some(h),
                Err(_) => tracing::warn!("Ignoring invalid KUBETRAIL_MAX_AGE_HOURS: {}", hours),
            }
        }

        if let Some(level) = lookup("KUBETRAIL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("KUBETRAIL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# kubetrail Configuration
#
# Environment variables override these settings:
# - KUBETRAIL_DATA_DIR
# - KUBETRAIL_PARTITION_MINUTES
# - KUBETRAIL_MAX_AGE_HOURS
# - KUBETRAIL_LOG_LEVEL
# - KUBETRAIL_LOG_FORMAT

[storage]
# Directory holding the database file
data_dir = "~/.local/share/kubetrail"

# Connections kept open for concurrent reads
pool_size = 8

# How long a writer waits for a lock (ms)
busy_timeout_ms = 5000

[partition]
# Width of one time partition (minutes)
duration_minutes = 60

[retention]
# Drop partitions older than this (hours)
# max_age_hours = 336

# Keep at most this many partitions
# max_partitions = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.storage.pool_size, 8);
        assert_eq!(config.partition.duration_minutes, 60);
        assert_eq!(config.partition.scheme(), PartitionScheme::default());
        assert!(config.retention.policy().is_unbounded());
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retention]
            max_age_hours = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.pool_size, 8);
        assert_eq!(
            config.retention.policy().max_age,
            Some(Duration::from_secs(7200))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubetrail.toml");
        std::fs::write(&path, "[storage]\npool_size = 2\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.pool_size, 2);

        std::fs::write(&path, "[storage\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KUBETRAIL_DATA_DIR", "/tmp/kt"),
            ("KUBETRAIL_PARTITION_MINUTES", "15"),
            ("KUBETRAIL_MAX_AGE_HOURS", "not-a-number"),
            ("KUBETRAIL_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.data_dir, "/tmp/kt");
        assert_eq!(config.partition.scheme().duration(), Duration::from_secs(900));
        assert_eq!(config.retention.max_age_hours, None);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_huge_durations_saturate() {
        let max = u64::MAX.to_string();
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "KUBETRAIL_PARTITION_MINUTES" | "KUBETRAIL_MAX_AGE_HOURS" => Some(max.clone()),
            _ => None,
        });

        assert_eq!(
            config.retention.policy().max_age,
            Some(Duration::from_secs(u64::MAX))
        );
        assert_eq!(
            config.partition.scheme().duration(),
            Duration::from_nanos(i64::MAX as u64)
        );
    }

    #[test]
    fn test_sqlite_settings() {
        let storage = StorageConfig {
            data_dir: "/var/lib/kubetrail".to_string(),
            pool_size: 0,
            ..Default::default()
        };
        let sqlite = storage.sqlite();
        assert_eq!(sqlite.data_dir, PathBuf::from("/var/lib/kubetrail"));
        assert_eq!(sqlite.pool_size, 1);
    }
}
