//! Error types for waymark-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a suggested command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for waymark-core
#[derive(Error, Debug)]
pub enum Error {
    /// Calibration errors (code validation, anchor misuse)
    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    /// Code scanning errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Tracking collaborator refused or lost the session
    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl Error {
    /// Return remediation guidance for the error.
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Calibration(err) => err.remediation(),
            Self::Scan(err) => err.remediation(),
            Self::Tracking(err) => err.remediation(),
            Self::Storage(err) => err.remediation(),
            Self::Config(err) => err.remediation(),
            Self::Session(err) => err.remediation(),
        }
    }
}

/// Calibration-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalibrationError {
    /// Scanned payload too short to be an event identifier
    #[error("invalid code {code:?}: must be at least {min_len} characters")]
    InvalidCode { code: String, min_len: usize },

    /// A relative position was applied against an anchor of another event
    #[error("marker belongs to event {marker_event:?}, anchor is for {anchor_event:?}")]
    EventMismatch {
        anchor_event: String,
        marker_event: String,
    },
}

impl CalibrationError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::InvalidCode { .. } => {
                Remediation::new("Scan the event code again; the payload was too short.")
                    .alternative("Make sure the printed code is the event code, not a test pattern.")
            }
            Self::EventMismatch { .. } => Remediation::new(
                "Markers can only be placed against the anchor of their own event.",
            )
            .command("List markers for an event", "waymark markers --event <ID>")
            .alternative("Recalibrate by scanning the code of the marker's event."),
        }
    }
}

/// Code scanning errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// No camera frame source could be acquired
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Scanning was stopped before a code was decoded
    #[error("scanning cancelled")]
    Cancelled,
}

impl ScanError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::CameraUnavailable(_) => {
                Remediation::new("Grant camera access and retry the scan.")
                    .alternative("Close other applications that may hold the camera.")
            }
            Self::Cancelled => Remediation::new("Scanning was cancelled. Start a new scan to calibrate."),
        }
    }
}

/// Tracking session errors reported by the tracking collaborator
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingError {
    /// Device or runtime has no tracking support
    #[error("tracking is not supported on this device")]
    Unsupported,

    /// The user or platform denied the tracking session
    #[error("tracking permission denied")]
    Denied,

    /// Tracking runtime was in a state that cannot start a session
    #[error("tracking runtime is in an invalid state")]
    StateInvalid,
}

impl TrackingError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Unsupported => Remediation::new("This device cannot start a tracking session.")
                .alternative("Use a device with spatial tracking support."),
            Self::Denied => Remediation::new("Allow camera and motion access, then retry.")
                .alternative("Calibration is kept; re-enter tracking once access is granted."),
            Self::StateInvalid => {
                Remediation::new("End any running tracking session and retry.")
                    .alternative("Calibration is kept; retrying does not require a new scan.")
            }
        }
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("marker store {path} is corrupt: {details}")]
    Corruption { path: String, details: String },

    #[error("failed to lock marker store {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("marker {marker_id} has a non-finite position")]
    NonFinitePosition { marker_id: String },

    #[error("failed to serialize markers: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StorageError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Io { .. } => {
                Remediation::new("Check data directory permissions and free space, then retry.")
                    .command("Show store stats", "waymark stats")
                    .alternative("Point --data-dir at a writable directory.")
            }
            Self::Corruption { .. } => Remediation::new(
                "The marker document could not be parsed. It was left untouched.",
            )
            .command("Export what is readable", "waymark export --out markers.json")
            .alternative("Restore the document from a backup, or clear it: waymark clear --yes"),
            Self::Lock { .. } => {
                Remediation::new("Another process holds the marker store lock. Retry shortly.")
            }
            Self::NonFinitePosition { .. } => Remediation::new(
                "The marker was not stored. Its position has a NaN or infinite component.",
            )
            .alternative("Re-run the hit test once tracking has a valid pose."),
            Self::Serialize(_) => Remediation::new("Marker serialization failed. Retry the operation."),
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(_) => Remediation::new("Create waymark.toml or pass --config.")
                .alternative("Omit --config to run with defaults."),
            Self::ReadFailed(..) => Remediation::new("Check the config file permissions."),
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax in waymark.toml."),
            Self::ValidationError(_) => {
                Remediation::new("Correct the invalid setting in waymark.toml.")
            }
        }
    }
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Event is not valid in the current state
    #[error("{event} is not valid in state {state}")]
    InvalidTransition { state: String, event: String },
}

impl SessionError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::InvalidTransition { .. } => {
                Remediation::new("Return to the start screen and select a role first.")
            }
        }
    }
}

/// Format an error with remediation for CLI output
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}\n");
    output.push('\n');
    output.push_str(&error.remediation().render_plain());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_available_for_error_variants() {
        let errors: Vec<Error> = vec![
            CalibrationError::InvalidCode {
                code: "ab".to_string(),
                min_len: 4,
            }
            .into(),
            ScanError::CameraUnavailable("busy".to_string()).into(),
            TrackingError::Denied.into(),
            StorageError::Corruption {
                path: "pontos.json".to_string(),
                details: "eof".to_string(),
            }
            .into(),
            ConfigError::ParseFailed("bad".to_string()).into(),
            SessionError::InvalidTransition {
                state: "start".to_string(),
                event: "scan".to_string(),
            }
            .into(),
        ];

        for err in errors {
            assert!(!err.remediation().summary.is_empty(), "{err}");
        }
    }

    #[test]
    fn render_plain_omits_empty_sections() {
        let text = Remediation::new("Just retry").render_plain();
        assert!(text.contains("Just retry"));
        assert!(!text.contains("Commands:"));
        assert!(!text.contains("Alternatives:"));
    }

    #[test]
    fn render_plain_includes_commands_and_alternatives() {
        let text = Remediation::new("Fix it")
            .command("Stats", "waymark stats")
            .alternative("Do something else")
            .render_plain();
        assert!(text.contains("Stats: waymark stats"));
        assert!(text.contains("Do something else"));
    }

    #[test]
    fn invalid_code_display_names_payload() {
        let err = CalibrationError::InvalidCode {
            code: "abc".to_string(),
            min_len: 4,
        };
        assert_eq!(
            err.to_string(),
            "invalid code \"abc\": must be at least 4 characters"
        );
    }

    #[test]
    fn format_error_includes_remediation() {
        let err: Error = TrackingError::Unsupported.into();
        let text = format_error_with_remediation(&err);
        assert!(text.starts_with("Error: Tracking error:"));
        assert!(text.contains("To fix:"));
    }
}
