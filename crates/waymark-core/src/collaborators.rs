//! Contracts for the external collaborators the core drives.
//!
//! The tracking engine, camera, code decoder, and scene renderer are black
//! boxes; these traits are the narrow surface the session controller and the
//! scanner rely on.

use glam::DVec3;
use serde::Serialize;

use crate::error::{ScanError, TrackingError};
use crate::reconstruction::Placement;

// =============================================================================
// Tracking
// =============================================================================

/// Spatial tracking engine.
///
/// The engine reports `sessionReady` once per activation and `sessionEnded` on
/// teardown by calling the corresponding controller transitions.
pub trait TrackingCollaborator {
    /// Ask the engine to start a tracking session.
    fn request_session_start(&mut self) -> Result<(), TrackingError>;

    /// Force teardown of the active session, if any.
    fn request_session_end(&mut self);

    /// Pose the anchor origin binds to once the session has stabilized.
    fn reference_origin(&self) -> DVec3 {
        DVec3::ZERO
    }
}

// =============================================================================
// Camera and decoder
// =============================================================================

/// One camera frame, row-major RGBA.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Camera feed used while scanning for a code.
pub trait FrameSource {
    /// Open the camera. Fails with [`ScanError::CameraUnavailable`].
    fn acquire(&mut self) -> Result<(), ScanError>;

    /// Latest frame, or `None` when the feed has no complete frame yet.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Release the camera. Must be safe to call more than once.
    fn release(&mut self);
}

/// Decodes a code payload from a frame.
pub trait CodeDecoder {
    fn decode(&mut self, frame: &Frame) -> Option<String>;
}

// =============================================================================
// Scene renderer / UI
// =============================================================================

/// Why a placement request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementRejection {
    /// No anchor is in effect.
    NotCalibrated,
    /// Viewers never create markers.
    ViewerRole,
    /// No tracking session is active.
    NotTracking,
    /// The session is active but the origin has not bound yet.
    OriginStabilizing,
    /// The hit point (or its offset from the origin) has a NaN or infinite component.
    NonFinitePosition,
}

impl std::fmt::Display for PlacementRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCalibrated => write!(f, "calibrate first"),
            Self::ViewerRole => write!(f, "viewers cannot place markers"),
            Self::NotTracking => write!(f, "tracking is not active"),
            Self::OriginStabilizing => write!(f, "tracking is still stabilizing"),
            Self::NonFinitePosition => write!(f, "hit point is not a finite position"),
        }
    }
}

/// User-visible messages the controller raises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum UserNotice {
    Calibrated { event_id: String },
    CalibrationCleared,
    InvalidCode { code: String },
    CameraUnavailable { reason: String },
    TrackingUnavailable { error: String },
    PlacementRejected { reason: PlacementRejection },
    MarkersCleared,
}

/// Rendering collaborator: owns the displayed marker instances.
pub trait SceneRenderer {
    /// Remove every placed marker instance.
    fn clear_placements(&mut self);

    /// Display one marker.
    fn place(&mut self, placement: &Placement);

    /// Enable or disable marker creation input.
    fn set_marker_creation_enabled(&mut self, enabled: bool);

    /// Show a message to the user.
    fn notify(&mut self, notice: &UserNotice);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_serialize_tagged() {
        let json = serde_json::to_value(UserNotice::PlacementRejected {
            reason: PlacementRejection::ViewerRole,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"notice": "placement_rejected", "reason": "viewer_role"})
        );
    }

    #[test]
    fn rejection_messages_are_readable() {
        assert_eq!(PlacementRejection::NotCalibrated.to_string(), "calibrate first");
    }

    struct FixedTracking;

    impl TrackingCollaborator for FixedTracking {
        fn request_session_start(&mut self) -> Result<(), TrackingError> {
            Ok(())
        }

        fn request_session_end(&mut self) {}
    }

    #[test]
    fn default_reference_origin_is_session_origin() {
        assert_eq!(FixedTracking.reference_origin(), DVec3::ZERO);
    }
}
