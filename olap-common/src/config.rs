//! Engine configuration
//!
//! Loaded from TOML. Discovery priority order:
//! 1. `OLAP_CONFIG` environment variable (path to a TOML file)
//! 2. Platform config directory (`<config_dir>/olap/config.toml`)
//! 3. Built-in defaults (in-memory storage)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "OLAP_CONFIG";

/// Which `Storage` backend the server is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Engine configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// SQLite database file, required when `storage = "sqlite"`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Ceiling on nested cell resolutions (rules and consolidation)
    #[serde(default = "default_max_resolution_depth")]
    pub max_resolution_depth: usize,

    /// Broadcast channel capacity for engine events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_resolution_depth() -> usize {
    256
}

fn default_event_capacity() -> usize {
    crate::events::DEFAULT_EVENT_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::default(),
            database_path: None,
            max_resolution_depth: default_max_resolution_depth(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file; a relative `database_path` resolves against the
    /// file's directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let (Some(db_path), Some(base)) = (config.database_path.as_ref(), path.parent()) {
            if db_path.is_relative() {
                config.database_path = Some(base.join(db_path));
            }
        }
        Ok(config)
    }

    /// Locate and load configuration, falling back to defaults
    pub fn discover() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading config from ${}: {}", CONFIG_ENV_VAR, path);
            return Self::load(Path::new(&path));
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return Self::load(&path);
            }
        }

        warn!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Reject settings the engine cannot run with
    ///
    /// `from_toml_str` and `load` call this; configurations built in code
    /// are checked when a server is constructed from them.
    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Sqlite && self.database_path.is_none() {
            return Err(Error::Config(
                "database_path is required when storage = \"sqlite\"".to_string(),
            ));
        }
        if self.max_resolution_depth == 0 {
            return Err(Error::Config(
                "max_resolution_depth must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("olap").join("config.toml"))
}
