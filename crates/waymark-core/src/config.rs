//! Configuration management for waymark
//!
//! Handles loading and validation of waymark.toml configuration files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::DEFAULT_STORAGE_KEY;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "WAYMARK_CONFIG";

/// Config file name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "waymark.toml";

/// Event codes of three characters or fewer are never accepted.
/// `calibration.min_code_len` may raise this floor, not lower it.
pub const MIN_EVENT_CODE_LEN: usize = 4;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Marker store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Calibration settings
    #[serde(default)]
    pub calibration: CalibrationConfig,

    /// Code scanner settings
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional log file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Marker store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding marker documents. Defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Storage key the whole marker collection is kept under
    #[serde(default = "default_storage_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            key: default_storage_key(),
        }
    }
}

impl StorageConfig {
    /// Data directory with the platform default applied.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("waymark")
        })
    }
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

/// Calibration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Shortest accepted event code, in characters (at least [`MIN_EVENT_CODE_LEN`])
    #[serde(default = "default_min_code_len")]
    pub min_code_len: usize,

    /// Delay after the tracking session is ready before the origin binds
    #[serde(default = "default_origin_grace_ms")]
    pub origin_grace_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_code_len: default_min_code_len(),
            origin_grace_ms: default_origin_grace_ms(),
        }
    }
}

impl CalibrationConfig {
    #[must_use]
    pub fn origin_grace(&self) -> Duration {
        Duration::from_millis(self.origin_grace_ms)
    }
}

fn default_min_code_len() -> usize {
    MIN_EVENT_CODE_LEN
}

fn default_origin_grace_ms() -> u64 {
    1000
}

/// Code scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Delay between poll iterations (one display frame)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl ScannerConfig {
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn default_frame_interval_ms() -> u64 {
    16
}

/// Resolve which config file to load.
///
/// An explicit path wins, then `WAYMARK_CONFIG`, then the platform config
/// directory. Returns `None` when no candidate file exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("waymark").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

impl Config {
    /// Load configuration from default locations, falling back to defaults.
    pub fn load() -> crate::Result<Self> {
        match resolve_config_path(None) {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No config file found; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the rest of the crate cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calibration.min_code_len < MIN_EVENT_CODE_LEN {
            return Err(ConfigError::ValidationError(format!(
                "calibration.min_code_len must be at least {MIN_EVENT_CODE_LEN}, got {}",
                self.calibration.min_code_len
            )));
        }
        if self.storage.key.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.key must not be empty".to_string(),
            ));
        }
        if self.storage.key.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "storage.key must not contain path separators: {}",
                self.storage.key
            )));
        }
        if self.general.log_level.parse::<crate::logging::LogLevel>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "general.log_level is not a log level: {}",
                self.general.log_level
            )));
        }
        Ok(())
    }
}
