//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::parser::StreamOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("loglens").join("loglens.db"))
        .unwrap_or_else(|| PathBuf::from("./loglens_data/loglens.db"))
}

fn default_batch_size() -> usize {
    1000
}

fn default_busy_timeout() -> u64 {
    5000 // 5 seconds
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            batch_size: default_batch_size(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl StorageConfig {
    /// Settings for opening the record store
    pub fn to_storage(&self) -> crate::storage::StorageConfig {
        crate::storage::StorageConfig {
            database_path: self.database_path.clone(),
            batch_size: self.batch_size,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

/// Import pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_max_recorded_errors")]
    pub max_recorded_errors: usize,

    /// Bytes read for format autodetection
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_max_recorded_errors() -> usize {
    100
}

fn default_sample_size() -> usize {
    1024 // 1 KB
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            max_recorded_errors: default_max_recorded_errors(),
            sample_size: default_sample_size(),
        }
    }
}

impl ImportConfig {
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            channel_capacity: self.channel_capacity,
            max_recorded_errors: self.max_recorded_errors,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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
            dirs::config_dir().map(|p| p.join("loglens").join("config.toml")),
            Some(PathBuf::from("./loglens.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Storage overrides
        if let Ok(path) = std::env::var("LOGLENS_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Ok(size) = std::env::var("LOGLENS_BATCH_SIZE") {
            if let Ok(n) = size.parse() {
                self.storage.batch_size = n;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("LOGLENS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOGLENS_LOG_FORMAT") {
            self.logging.format = format;
        }
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
    r#"# LogLens Configuration
#
# Environment variables override these settings:
# - LOGLENS_DATABASE_PATH
# - LOGLENS_BATCH_SIZE
# - LOGLENS_LOG_LEVEL
# - LOGLENS_LOG_FORMAT

[storage]
# SQLite database file
database_path = "~/.local/share/loglens/loglens.db"

# Records written per transaction
batch_size = 1000

# How long to wait on a locked database (ms)
busy_timeout_ms = 5000

[import]
# Records buffered between parser and writer
channel_capacity = 1000

# Per-line parse errors kept in an import result
max_recorded_errors = 100

# Bytes sampled for format autodetection
sample_size = 1024

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
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.batch_size, 1000);
        assert_eq!(config.import.sample_size, 1024);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.storage.database_path.ends_with("loglens.db"));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loglens.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[storage]\nbatch_size = 50\n\n[logging]\nformat = \"json\"").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.batch_size, 50);
        assert_eq!(config.storage.busy_timeout_ms, 5000);
        assert_eq!(config.import.channel_capacity, 1000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generated_template_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.import.max_recorded_errors, 100);
        assert_eq!(config.storage.to_storage().batch_size, 1000);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[storage\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
