//! Structured logging for waymark
//!
//! One global `tracing` subscriber: an `EnvFilter`, a stderr layer, and an
//! optional log-file layer, both in the format chosen by `[general]`.
//!
//! ```ignore
//! use waymark_core::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from(&config.general))?;
//! ```
//!
//! # Correlation Fields
//!
//! Use these field names consistently in spans and events:
//! - `event_id`: Event identifier decoded from the scanned code
//! - `marker_id`: Marker identifier
//! - `role`: Session role (operator, viewer)
//! - `state`: Session lifecycle state

use std::fs::{File, OpenOptions};
use std::io;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub use crate::config::LogFormat;
use crate::config::GeneralConfig;

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Subscriber the output layers sit on.
type Filtered = Layered<EnvFilter, Registry>;
type OutputLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// Logging settings, usually taken from the `[general]` config section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default level; `RUST_LOG` directives take precedence.
    pub level: String,
    pub format: LogFormat,
    /// Also append log lines to this file (created with mode 0600).
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&GeneralConfig::default())
    }
}

impl From<&GeneralConfig> for LogConfig {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            level: general.log_level.clone(),
            format: general.log_format,
            file: general.log_file.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,

    #[error("{0}")]
    InvalidLevel(String),

    #[error("failed to open log file: {0}")]
    FileCreate(#[from] io::Error),

    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Install the global subscriber. Only the first successful call takes effect.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let level: LogLevel = config.level.parse().map_err(LogError::InvalidLevel)?;
    if LOGGING_INITIALIZED.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(Level::from(level)).into())
        .from_env_lossy();

    let file_layer = match &config.file {
        Some(path) => Some(output_layer(config.format, open_log_file(path)?, false)),
        None => None,
    };
    let outputs = output_layer(config.format, io::stderr, true).and_then(file_layer);

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(outputs))?;
    let _ = LOGGING_INITIALIZED.set(());

    tracing::info!(
        log_level = %config.level,
        log_format = %config.format,
        log_file = ?config.file,
        "Logging initialized"
    );
    Ok(())
}

fn output_layer<W>(format: LogFormat, writer: W, ansi: bool) -> OutputLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_target(true);
    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer
            .json()
            .with_timer(SystemTime)
            .with_current_span(true)
            .with_span_list(false)
            .flatten_event(true)
            .boxed(),
    }
}

/// Open `path` for appending, creating it and its parent directory if needed.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path)
}

/// Level names accepted by `general.log_level` and `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!(
                "unknown log level: {s}. Expected one of: trace, debug, info, warn, error"
            )),
        }
    }
}
