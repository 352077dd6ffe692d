//! Session Lifecycle Controller.
//!
//! A single controller instance owns the role, the calibration manager, the
//! marker store, and the tracking/renderer collaborators. Every external
//! notification (role choice, scan result, tracking ready/ended, placement
//! input) is a method taking the notification payload; the state table below
//! is the authority for what each one does.
//!
//! | From | Input | To |
//! |------|-------|----|
//! | `Start` | `select_role` | `RoleSelected` |
//! | `RoleSelected` | `scan_succeeded` | `Calibrated` (tracking requested) |
//! | `Calibrated` | `scan_succeeded` | `Calibrated` (recalibrated) |
//! | `Tracking` | `scan_succeeded` | `Tracking{Stabilizing}` (recalibrated) |
//! | `Calibrated` | `tracking_ready` | `Tracking{Stabilizing}` |
//! | `Tracking{Stabilizing}` | `origin_settled` | `Tracking{Active}` (origin bound, reconstructed) |
//! | `Tracking` | `tracking_ended` | `Calibrated` |
//! | any | `go_home` | `Start` |
//!
//! Origin binding is deferred by the configured grace delay after the tracking
//! session reports ready. Each activation (and each recalibration while
//! tracking) gets a new [`OriginGrace`] ticket; a ticket from an earlier
//! activation is ignored when it finally settles.

use std::time::Duration;

use glam::DVec3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::{Anchor, CalibrationChange, CalibrationManager};
use crate::collaborators::{PlacementRejection, SceneRenderer, TrackingCollaborator, UserNotice};
use crate::config::CalibrationConfig;
use crate::error::{ScanError, SessionError, TrackingError};
use crate::marker::{Marker, Role};
use crate::reconstruction::{Placement, reconstruct_into};
use crate::store::MarkerStore;
use crate::translator::relative_position;

// =============================================================================
// States
// =============================================================================

/// Sub-phase of an active tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPhase {
    /// Waiting out the grace delay; origin unbound, nothing placed.
    Stabilizing,
    /// Origin bound and markers reconstructed.
    Active,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Start,
    RoleSelected { role: Role },
    Calibrated { role: Role },
    Tracking { role: Role, phase: TrackingPhase },
}

impl SessionState {
    #[must_use]
    pub const fn role(self) -> Option<Role> {
        match self {
            Self::Start => None,
            Self::RoleSelected { role } | Self::Calibrated { role } | Self::Tracking { role, .. } => {
                Some(role)
            }
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RoleSelected { .. } => "role_selected",
            Self::Calibrated { .. } => "calibrated",
            Self::Tracking {
                phase: TrackingPhase::Stabilizing,
                ..
            } => "tracking(stabilizing)",
            Self::Tracking {
                phase: TrackingPhase::Active,
                ..
            } => "tracking(active)",
        }
    }

    #[must_use]
    pub const fn is_tracking(self) -> bool {
        matches!(self, Self::Tracking { .. })
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Transition outcomes
// =============================================================================

/// Ticket for one pending origin binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginGrace {
    activation: u64,
    /// How long to wait before calling [`SessionController::origin_settled`].
    pub delay: Duration,
}

impl OriginGrace {
    #[must_use]
    pub const fn activation(&self) -> u64 {
        self.activation
    }
}

/// What a successful scan led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// Tracking session requested (now, or by an earlier scan that is still
    /// pending); wait for `tracking_ready`.
    TrackingRequested,
    /// Calibrated, but the tracking collaborator refused to start.
    TrackingUnavailable(TrackingError),
    /// Recalibrated during an active session; settle the new origin after the grace.
    Recalibrated(OriginGrace),
}

/// Result of a placement request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed(Marker),
    Rejected(PlacementRejection),
}

/// Counts for the host's status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub state: SessionState,
    pub event_id: Option<String>,
    /// Markers stored for the current event.
    pub event_markers: usize,
    pub total_markers: usize,
    pub event_count: usize,
    /// Markers placed since the last `go_home` or clear-all.
    pub created_this_session: u64,
}

// =============================================================================
// Controller
// =============================================================================

pub struct SessionController<S, T, R> {
    calibration: CalibrationManager,
    store: S,
    tracking: T,
    renderer: R,
    state: SessionState,
    origin_grace: Duration,
    /// Bumped on every tracking activation, recalibration, and teardown.
    activation: u64,
    /// Marker instances currently handed to the renderer.
    displayed: usize,
    created_this_session: u64,
    /// A tracking session was requested or reported ready and has not ended.
    session_requested: bool,
}

impl<S, T, R> SessionController<S, T, R>
where
    S: MarkerStore,
    T: TrackingCollaborator,
    R: SceneRenderer,
{
    pub fn new(config: &CalibrationConfig, store: S, tracking: T, renderer: R) -> Self {
        let mut controller = Self {
            calibration: CalibrationManager::new(config),
            store,
            tracking,
            renderer,
            state: SessionState::Start,
            origin_grace: config.origin_grace(),
            activation: 0,
            displayed: 0,
            created_this_session: 0,
            session_requested: false,
        };
        controller.sync_creation_enabled();
        controller
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.state.role()
    }

    #[must_use]
    pub fn anchor(&self) -> Option<&Anchor> {
        self.calibration.anchor()
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    #[must_use]
    pub fn created_this_session(&self) -> u64 {
        self.created_this_session
    }

    /// Operator, calibrated, tracking, origin bound.
    #[must_use]
    pub fn marker_creation_enabled(&self) -> bool {
        matches!(
            self.state,
            SessionState::Tracking {
                role: Role::Operator,
                phase: TrackingPhase::Active,
            }
        )
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tracking(&self) -> &T {
        &self.tracking
    }

    pub fn tracking_mut(&mut self) -> &mut T {
        &mut self.tracking
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn summary(&self) -> crate::Result<SessionSummary> {
        let stats = self.store.summary()?;
        let event_id = self.anchor().map(|a| a.event_id().to_string());
        Ok(SessionSummary {
            state: self.state,
            event_markers: event_id.as_deref().map_or(0, |id| stats.markers_for(id)),
            event_id,
            total_markers: stats.marker_count,
            event_count: stats.event_count,
            created_this_session: self.created_this_session,
        })
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    pub fn select_role(&mut self, role: Role) -> crate::Result<()> {
        if self.state != SessionState::Start {
            return Err(self.invalid("select_role").into());
        }
        self.set_state(SessionState::RoleSelected { role });
        Ok(())
    }

    /// A code was decoded. Validates it and (re)establishes the anchor.
    ///
    /// An invalid code leaves every piece of state untouched and is reported
    /// both as a notice and as [`CalibrationError::InvalidCode`].
    ///
    /// [`CalibrationError::InvalidCode`]: crate::error::CalibrationError::InvalidCode
    pub fn scan_succeeded(&mut self, raw_code: &str) -> crate::Result<CalibrationOutcome> {
        let Some(role) = self.state.role() else {
            return Err(self.invalid("scan_succeeded").into());
        };

        let change = match self.calibration.establish(raw_code) {
            Ok(change) => change,
            Err(err) => {
                warn!(role = %role, state = %self.state, error = %err, "Scanned code rejected");
                self.renderer.notify(&UserNotice::InvalidCode {
                    code: raw_code.to_string(),
                });
                return Err(err.into());
            }
        };
        self.on_calibration_change(&change);

        if self.state.is_tracking() {
            self.set_state(SessionState::Tracking {
                role,
                phase: TrackingPhase::Stabilizing,
            });
            return Ok(CalibrationOutcome::Recalibrated(self.next_grace()));
        }

        self.set_state(SessionState::Calibrated { role });
        Ok(match self.enter_tracking() {
            Ok(()) => CalibrationOutcome::TrackingRequested,
            Err(err) => CalibrationOutcome::TrackingUnavailable(err),
        })
    }

    /// Scanning ended without a code. State is unchanged.
    pub fn scan_failed(&mut self, error: &ScanError) -> crate::Result<()> {
        if self.state == SessionState::Start {
            return Err(self.invalid("scan_failed").into());
        }
        match error {
            ScanError::CameraUnavailable(reason) => {
                warn!(state = %self.state, reason = %reason, "Camera unavailable");
                self.renderer.notify(&UserNotice::CameraUnavailable {
                    reason: reason.clone(),
                });
            }
            ScanError::Cancelled => debug!(state = %self.state, "Scan cancelled"),
        }
        Ok(())
    }

    /// Ask the tracking collaborator for a session. Only valid while calibrated.
    ///
    /// A refusal is surfaced to the user and the controller stays calibrated.
    /// While an earlier request is still outstanding no second one is made.
    pub fn enter_tracking(&mut self) -> Result<(), TrackingError> {
        if !matches!(self.state, SessionState::Calibrated { .. }) {
            debug!(state = %self.state, "Tracking request ignored");
            return Ok(());
        }
        if self.session_requested {
            debug!(state = %self.state, "Tracking session already requested");
            return Ok(());
        }
        if let Err(err) = self.tracking.request_session_start() {
            warn!(state = %self.state, error = %err, "Tracking session refused");
            self.renderer.notify(&UserNotice::TrackingUnavailable {
                error: err.to_string(),
            });
            return Err(err);
        }
        self.session_requested = true;
        info!(state = %self.state, "Tracking session requested");
        Ok(())
    }

    /// The tracking collaborator reported a ready reference frame.
    ///
    /// Returns the grace ticket to settle, or `None` when this activation is
    /// already tracking (repeated readiness is ignored).
    pub fn tracking_ready(&mut self) -> crate::Result<Option<OriginGrace>> {
        match self.state {
            SessionState::Calibrated { role } => {
                self.session_requested = true;
                self.set_state(SessionState::Tracking {
                    role,
                    phase: TrackingPhase::Stabilizing,
                });
                Ok(Some(self.next_grace()))
            }
            SessionState::Tracking { .. } => {
                debug!(state = %self.state, "Duplicate tracking-ready ignored");
                Ok(None)
            }
            _ => Err(self.invalid("tracking_ready").into()),
        }
    }

    /// The grace delay elapsed: bind the origin, then reconstruct.
    ///
    /// Returns the number of placements, or `None` if the ticket is stale or
    /// the origin was already settled for this activation. On a storage
    /// failure the phase stays `Stabilizing` and the ticket may be retried.
    pub fn origin_settled(&mut self, grace: OriginGrace) -> crate::Result<Option<usize>> {
        let SessionState::Tracking {
            role,
            phase: TrackingPhase::Stabilizing,
        } = self.state
        else {
            debug!(state = %self.state, "Origin settle ignored outside stabilizing phase");
            return Ok(None);
        };
        if grace.activation != self.activation {
            debug!(
                ticket = grace.activation,
                current = self.activation,
                "Stale origin grace ticket ignored"
            );
            return Ok(None);
        }

        self.calibration.bind_origin(self.tracking.reference_origin());
        let Some(anchor) = self.calibration.anchor() else {
            return Ok(None);
        };
        let placed = reconstruct_into(anchor, &self.store, &mut self.renderer)?;
        self.displayed = placed;
        self.set_state(SessionState::Tracking {
            role,
            phase: TrackingPhase::Active,
        });
        Ok(Some(placed))
    }

    /// Wait out the grace delay on the tokio clock, then settle the origin.
    pub async fn settle_origin_after_grace(
        &mut self,
        grace: OriginGrace,
    ) -> crate::Result<Option<usize>> {
        tokio::time::sleep(grace.delay).await;
        self.origin_settled(grace)
    }

    /// The tracking session was torn down. The anchor is kept; its origin is
    /// unbound so the next activation binds its own.
    ///
    /// Outside tracking this only forgets an outstanding request, so that
    /// `enter_tracking` may ask again.
    pub fn tracking_ended(&mut self) {
        self.session_requested = false;
        let SessionState::Tracking { role, .. } = self.state else {
            debug!(state = %self.state, "Tracking-ended outside tracking");
            return;
        };
        self.activation += 1;
        self.calibration.unbind_origin();
        self.clear_displayed();
        self.set_state(SessionState::Calibrated { role });
    }

    /// Return to the start screen from any state.
    ///
    /// Ends the tracking session if one is running or still being started.
    pub fn go_home(&mut self) {
        if self.session_requested || self.state.is_tracking() {
            self.tracking.request_session_end();
        }
        self.session_requested = false;
        if let Some(change) = self.calibration.clear() {
            self.on_calibration_change(&change);
        }
        self.activation += 1;
        self.clear_displayed();
        self.created_this_session = 0;
        self.set_state(SessionState::Start);
    }

    /// Create a marker at an absolute hit point of the active session.
    ///
    /// The marker is persisted before it is shown; a storage failure leaves
    /// neither the store, the display, nor the counter changed. A hit point
    /// that is NaN or infinite, or whose offset from the origin overflows, is
    /// rejected before anything is written.
    pub fn place_marker(&mut self, absolute: DVec3) -> crate::Result<PlacementOutcome> {
        if let Some(reason) = self.placement_rejection() {
            return Ok(self.reject_placement(reason));
        }
        let Some(anchor) = self.calibration.anchor() else {
            return Ok(self.reject_placement(PlacementRejection::NotCalibrated));
        };

        let relative = relative_position(anchor, absolute);
        if !absolute.is_finite() || !relative.is_finite() {
            debug!(absolute = ?absolute, relative = %relative, "Non-finite hit point");
            return Ok(self.reject_placement(PlacementRejection::NonFinitePosition));
        }
        let marker = Marker::new(anchor.event_id(), relative, Role::Operator);
        self.store.append_marker(&marker)?;

        let placement = Placement {
            position: absolute,
            marker: marker.clone(),
            variation_index: self.displayed,
        };
        self.renderer.place(&placement);
        self.displayed += 1;
        self.created_this_session += 1;
        info!(
            marker_id = %marker.id,
            event_id = %marker.event_id,
            relative = %marker.relative_position,
            created = self.created_this_session,
            "Marker placed"
        );
        Ok(PlacementOutcome::Placed(marker))
    }

    /// Remove every stored marker for every event. Allowed in any state.
    pub fn clear_all_markers(&mut self) -> crate::Result<()> {
        self.store.clear_all_markers()?;
        self.clear_displayed();
        self.created_this_session = 0;
        info!(state = %self.state, "All markers cleared");
        self.renderer.notify(&UserNotice::MarkersCleared);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn reject_placement(&mut self, reason: PlacementRejection) -> PlacementOutcome {
        info!(state = %self.state, reason = %reason, "Placement rejected");
        self.renderer.notify(&UserNotice::PlacementRejected { reason });
        PlacementOutcome::Rejected(reason)
    }

    fn placement_rejection(&self) -> Option<PlacementRejection> {
        match self.state {
            SessionState::Start | SessionState::RoleSelected { .. } => {
                Some(PlacementRejection::NotCalibrated)
            }
            SessionState::Calibrated { role } | SessionState::Tracking { role, .. }
                if !role.can_place() =>
            {
                Some(PlacementRejection::ViewerRole)
            }
            SessionState::Calibrated { .. } => Some(PlacementRejection::NotTracking),
            SessionState::Tracking {
                phase: TrackingPhase::Stabilizing,
                ..
            } => Some(PlacementRejection::OriginStabilizing),
            SessionState::Tracking {
                phase: TrackingPhase::Active,
                ..
            } => None,
        }
    }

    /// Synchronous handler for calibration state changes.
    fn on_calibration_change(&mut self, change: &CalibrationChange) {
        match change {
            CalibrationChange::Established { event_id, replaced } => {
                if let Some(old) = replaced {
                    info!(event_id = %event_id, replaced = %old, "Recalibrated; clearing old placements");
                }
                self.clear_displayed();
                self.renderer.notify(&UserNotice::Calibrated {
                    event_id: event_id.clone(),
                });
            }
            CalibrationChange::Cleared { event_id } => {
                debug!(event_id = %event_id, "Calibration cleared");
                self.renderer.notify(&UserNotice::CalibrationCleared);
            }
        }
        self.sync_creation_enabled();
    }

    fn next_grace(&mut self) -> OriginGrace {
        self.activation += 1;
        OriginGrace {
            activation: self.activation,
            delay: self.origin_grace,
        }
    }

    fn clear_displayed(&mut self) {
        self.renderer.clear_placements();
        self.displayed = 0;
    }

    fn set_state(&mut self, next: SessionState) {
        if next != self.state {
            info!(from = %self.state, state = %next, role = ?next.role(), "Session transition");
            self.state = next;
        }
        self.sync_creation_enabled();
    }

    fn sync_creation_enabled(&mut self) {
        let enabled = self.marker_creation_enabled();
        self.renderer.set_marker_creation_enabled(enabled);
    }

    fn invalid(&self, event: &str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state.to_string(),
            event: event.to_string(),
        }
    }
}
