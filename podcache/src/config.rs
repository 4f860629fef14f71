//! Configuration for the pool cache and its logging.
//!
//! Settings can be built in code or loaded from an INI file:
//!
//! ```ini
//! [pool]
//! reclaim_empty_groups = true
//!
//! [logging]
//! directory = /var/log/podcache
//! file = podcache.log
//! ```
//!
//! A missing file or missing key falls back to the default.

use crate::logging::{default_log_dir, default_log_file};
use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to parse config text
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ini::ParseError),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Settings
// =============================================================================

/// Behaviour switches for the pool cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolCacheConfig {
    /// Drop a function group once it has no instances, no specialization in
    /// progress and no waiting callers. Off by default: groups are kept for
    /// the life of the cache.
    pub reclaim_empty_groups: bool,
}

impl PoolCacheConfig {
    pub fn with_reclaim_empty_groups(mut self, reclaim: bool) -> Self {
        self.reclaim_empty_groups = reclaim;
        self
    }
}

/// Log output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(default_log_dir()),
            file: default_log_file().to_string(),
        }
    }
}

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// `[pool]` section
    pub pool: PoolCacheConfig,
    /// `[logging]` section
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        parse_ini(&ini)
    }
}

/// Get the path to the default config file (~/.podcache/config.ini).
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".podcache")
        .join("config.ini")
}

// =============================================================================
// Parsing
// =============================================================================

fn parse_ini(ini: &Ini) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    // [pool] section
    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = section.get("reclaim_empty_groups") {
            settings.pool.reclaim_empty_groups = parse_bool("pool", "reclaim_empty_groups", v)?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("logging", "directory", v, "must not be empty"));
            }
            settings.logging.directory = PathBuf::from(v);
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if v.is_empty() {
                return Err(invalid("logging", "file", v, "must not be empty"));
            }
            settings.logging.file = v.to_string();
        }
    }

    Ok(settings)
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
