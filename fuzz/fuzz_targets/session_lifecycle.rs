#![no_main]

use glam::DVec3;
use libfuzzer_sys::fuzz_target;
use waymark_core::collaborators::{SceneRenderer, TrackingCollaborator, UserNotice};
use waymark_core::config::CalibrationConfig;
use waymark_core::error::{ScanError, TrackingError};
use waymark_core::marker::Role;
use waymark_core::reconstruction::Placement;
use waymark_core::session::{
    CalibrationOutcome, OriginGrace, PlacementOutcome, SessionController, SessionState,
    TrackingPhase,
};
use waymark_core::store::{MarkerStore, MemoryStore};

const CODES: [&str; 5] = ["", "abc", "EVENT-A", "EVENT-B", "ação"];

#[derive(Default)]
struct Tracking {
    origin: DVec3,
    refuse: bool,
}

impl TrackingCollaborator for Tracking {
    fn request_session_start(&mut self) -> Result<(), TrackingError> {
        if self.refuse {
            Err(TrackingError::StateInvalid)
        } else {
            Ok(())
        }
    }

    fn request_session_end(&mut self) {}

    fn reference_origin(&self) -> DVec3 {
        self.origin
    }
}

#[derive(Default)]
struct Renderer {
    displayed: Vec<Placement>,
    creation_enabled: bool,
}

impl SceneRenderer for Renderer {
    fn clear_placements(&mut self) {
        self.displayed.clear();
    }

    fn place(&mut self, placement: &Placement) {
        self.displayed.push(placement.clone());
    }

    fn set_marker_creation_enabled(&mut self, enabled: bool) {
        self.creation_enabled = enabled;
    }

    fn notify(&mut self, _notice: &UserNotice) {}
}

fn coord(raw: u8) -> f64 {
    f64::from(raw) / 16.0 - 8.0
}

fn check_invariants(c: &SessionController<MemoryStore, Tracking, Renderer>) {
    let state = c.state();
    assert_eq!(
        c.renderer().creation_enabled,
        c.marker_creation_enabled(),
        "renderer enablement out of sync in {state}"
    );

    match state {
        SessionState::Start | SessionState::RoleSelected { .. } => {
            assert!(!c.is_calibrated(), "calibrated in {state}");
            assert!(c.renderer().displayed.is_empty(), "placements shown in {state}");
        }
        SessionState::Calibrated { .. } => {
            assert!(c.is_calibrated());
            assert!(c.renderer().displayed.is_empty(), "placements shown while not tracking");
        }
        SessionState::Tracking { phase, .. } => {
            let anchor = c.anchor().expect("tracking without anchor");
            match phase {
                TrackingPhase::Stabilizing => {
                    assert!(!anchor.has_origin(), "origin bound during grace");
                    assert!(c.renderer().displayed.is_empty());
                }
                TrackingPhase::Active => assert!(anchor.has_origin()),
            }
            for placement in &c.renderer().displayed {
                assert_eq!(placement.marker.event_id, anchor.event_id());
            }
        }
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 16_384 {
        return;
    }

    let mut c = SessionController::new(
        &CalibrationConfig::default(),
        MemoryStore::new(),
        Tracking::default(),
        Renderer::default(),
    );
    let mut graces: Vec<OriginGrace> = Vec::new();

    for chunk in data.chunks_exact(4) {
        let [op, a, b, d] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let stored_before = c.store().len();

        match op % 10 {
            0 => {
                let role = if a & 1 == 0 { Role::Operator } else { Role::Viewer };
                let _ = c.select_role(role);
            }
            1 => {
                let code = CODES[usize::from(a) % CODES.len()];
                if let Ok(CalibrationOutcome::Recalibrated(grace)) = c.scan_succeeded(code) {
                    graces.push(grace);
                }
            }
            2 => {
                let err = if a & 1 == 0 {
                    ScanError::Cancelled
                } else {
                    ScanError::CameraUnavailable("fuzz".to_string())
                };
                let _ = c.scan_failed(&err);
            }
            3 => {
                if let Ok(Some(grace)) = c.tracking_ready() {
                    graces.push(grace);
                }
            }
            4 => {
                if !graces.is_empty() {
                    let grace = graces[usize::from(a) % graces.len()];
                    let _ = c.origin_settled(grace);
                }
            }
            5 => c.tracking_ended(),
            6 => c.go_home(),
            7 => {
                let role = c.role();
                let enabled = c.marker_creation_enabled();
                let outcome = c
                    .place_marker(DVec3::new(coord(a), coord(b), coord(d)))
                    .expect("memory store never fails");
                match outcome {
                    PlacementOutcome::Placed(marker) => {
                        assert!(enabled, "placed while creation disabled");
                        assert_eq!(role, Some(Role::Operator));
                        assert_eq!(c.store().len(), stored_before + 1);
                        assert_eq!(Some(marker.event_id.as_str()), c.anchor().map(|a| a.event_id()));
                    }
                    PlacementOutcome::Rejected(_) => {
                        assert_eq!(c.store().len(), stored_before);
                    }
                }
            }
            8 => {
                let _ = c.clear_all_markers();
                assert!(c.store().load_all_markers().map(|m| m.is_empty()).unwrap_or(false));
            }
            _ => {
                c.tracking_mut().refuse = a & 1 == 1;
                c.tracking_mut().origin = DVec3::new(coord(b), 0.0, coord(d));
                let _ = c.enter_tracking();
            }
        }

        if op % 10 != 7 && op % 10 != 8 {
            assert_eq!(c.store().len(), stored_before, "store changed outside placement");
        }
        check_invariants(&c);
    }
});
