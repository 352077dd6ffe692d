//! Calibration Manager: binds a scanned event code to a tracking-session origin.
//!
//! An [`Anchor`] is created when a code passes validation and is replaced
//! wholesale on recalibration. Its origin is bound at most once per tracking
//! session and unbound when that session ends.

use chrono::{DateTime, Utc};
use glam::DVec3;
use tracing::{debug, info};

use crate::config::{CalibrationConfig, MIN_EVENT_CODE_LEN};
use crate::error::CalibrationError;

/// The reference frame for one calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    event_id: String,
    established_at: DateTime<Utc>,
    origin_pose: Option<DVec3>,
}

impl Anchor {
    /// Anchor for `event_id` with no origin bound yet.
    #[must_use]
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            established_at: Utc::now(),
            origin_pose: None,
        }
    }

    /// Anchor with an origin already bound. Mostly useful in tests and replays.
    #[must_use]
    pub fn with_origin(event_id: impl Into<String>, origin: DVec3) -> Self {
        let mut anchor = Self::new(event_id);
        anchor.origin_pose = Some(origin);
        anchor
    }

    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    #[must_use]
    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }

    #[must_use]
    pub fn origin_pose(&self) -> Option<DVec3> {
        self.origin_pose
    }

    #[must_use]
    pub fn has_origin(&self) -> bool {
        self.origin_pose.is_some()
    }

    /// Set the origin if none is bound. Returns whether this call bound it.
    pub fn bind_origin(&mut self, pose: DVec3) -> bool {
        if self.origin_pose.is_some() {
            return false;
        }
        self.origin_pose = Some(pose);
        true
    }

    fn unbind_origin(&mut self) {
        self.origin_pose = None;
    }
}

/// A change in calibration state, handed synchronously to the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationChange {
    /// A new anchor is in effect; `replaced` names the discarded event, if any.
    Established {
        event_id: String,
        replaced: Option<String>,
    },
    /// The anchor for `event_id` was dropped.
    Cleared { event_id: String },
}

/// Owns the single anchor currently in effect.
#[derive(Debug, Clone)]
pub struct CalibrationManager {
    min_code_len: usize,
    anchor: Option<Anchor>,
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(&CalibrationConfig::default())
    }
}

impl CalibrationManager {
    /// A configured minimum below [`MIN_EVENT_CODE_LEN`] is raised to it.
    #[must_use]
    pub fn new(config: &CalibrationConfig) -> Self {
        Self {
            min_code_len: config.min_code_len.max(MIN_EVENT_CODE_LEN),
            anchor: None,
        }
    }

    /// Check a decoded payload without touching calibration state.
    pub fn validate_code(&self, raw_code: &str) -> Result<(), CalibrationError> {
        if raw_code.chars().count() < self.min_code_len {
            return Err(CalibrationError::InvalidCode {
                code: raw_code.to_string(),
                min_len: self.min_code_len,
            });
        }
        Ok(())
    }

    /// Replace any current anchor with a fresh one for `raw_code`.
    ///
    /// On rejection the current anchor is left untouched.
    pub fn establish(&mut self, raw_code: &str) -> Result<CalibrationChange, CalibrationError> {
        self.validate_code(raw_code)?;
        let replaced = self
            .anchor
            .replace(Anchor::new(raw_code))
            .map(|old| old.event_id);
        info!(event_id = %raw_code, replaced = ?replaced, "Calibration established");
        Ok(CalibrationChange::Established {
            event_id: raw_code.to_string(),
            replaced,
        })
    }

    /// Bind the current anchor's origin. No-op when uncalibrated or already bound.
    pub fn bind_origin(&mut self, pose: DVec3) -> bool {
        let Some(anchor) = self.anchor.as_mut() else {
            return false;
        };
        let bound = anchor.bind_origin(pose);
        if bound {
            info!(event_id = %anchor.event_id, origin = ?pose, "Anchor origin bound");
        } else {
            debug!(event_id = %anchor.event_id, "Anchor origin already bound; ignoring");
        }
        bound
    }

    /// Forget the bound origin so the next tracking session binds its own.
    pub fn unbind_origin(&mut self) {
        if let Some(anchor) = self.anchor.as_mut() {
            anchor.unbind_origin();
        }
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.anchor.is_some()
    }

    #[must_use]
    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    /// Drop the current anchor, reporting which event was cleared.
    pub fn clear(&mut self) -> Option<CalibrationChange> {
        let anchor = self.anchor.take()?;
        info!(event_id = %anchor.event_id, "Calibration cleared");
        Some(CalibrationChange::Cleared {
            event_id: anchor.event_id,
        })
    }
}
