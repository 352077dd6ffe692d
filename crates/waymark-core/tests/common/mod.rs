//! Shared fakes for waymark-core integration tests.

#![allow(dead_code)]

use glam::DVec3;
use waymark_core::StorageError;
use waymark_core::collaborators::{SceneRenderer, TrackingCollaborator, UserNotice};
use waymark_core::config::CalibrationConfig;
use waymark_core::error::TrackingError;
use waymark_core::marker::Marker;
use waymark_core::reconstruction::Placement;
use waymark_core::session::SessionController;
use waymark_core::store::{MarkerStore, MemoryStore};

// ---------------------------------------------------------------------------
// FakeTracking: records start/end requests, reports a fixed session origin
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeTracking {
    pub starts: usize,
    pub ends: usize,
    pub origin: DVec3,
    pub refuse: Option<TrackingError>,
}

impl TrackingCollaborator for FakeTracking {
    fn request_session_start(&mut self) -> Result<(), TrackingError> {
        match self.refuse {
            Some(err) => Err(err),
            None => {
                self.starts += 1;
                Ok(())
            }
        }
    }

    fn request_session_end(&mut self) {
        self.ends += 1;
    }

    fn reference_origin(&self) -> DVec3 {
        self.origin
    }
}

// ---------------------------------------------------------------------------
// FakeRenderer: keeps the currently displayed placements and every notice
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub displayed: Vec<Placement>,
    pub notices: Vec<UserNotice>,
    pub creation_enabled: bool,
    pub clears: usize,
}

impl FakeRenderer {
    pub fn displayed_events(&self) -> Vec<&str> {
        self.displayed
            .iter()
            .map(|p| p.marker.event_id.as_str())
            .collect()
    }
}

impl SceneRenderer for FakeRenderer {
    fn clear_placements(&mut self) {
        self.displayed.clear();
        self.clears += 1;
    }

    fn place(&mut self, placement: &Placement) {
        self.displayed.push(placement.clone());
    }

    fn set_marker_creation_enabled(&mut self, enabled: bool) {
        self.creation_enabled = enabled;
    }

    fn notify(&mut self, notice: &UserNotice) {
        self.notices.push(notice.clone());
    }
}

// ---------------------------------------------------------------------------
// FlakyStore: MemoryStore that can be told to fail reads or writes
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl FlakyStore {
    fn failure(op: &str) -> StorageError {
        StorageError::Io {
            path: "flaky".to_string(),
            source: std::io::Error::other(format!("injected {op} failure")),
        }
    }
}

impl MarkerStore for FlakyStore {
    fn load_all_markers(&self) -> Result<Vec<Marker>, StorageError> {
        if self.fail_reads {
            return Err(Self::failure("read"));
        }
        self.inner.load_all_markers()
    }

    fn append_marker(&mut self, marker: &Marker) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(Self::failure("write"));
        }
        self.inner.append_marker(marker)
    }

    fn clear_all_markers(&mut self) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(Self::failure("clear"));
        }
        self.inner.clear_all_markers()
    }
}

pub fn controller_with<S: MarkerStore>(
    store: S,
    origin: DVec3,
) -> SessionController<S, FakeTracking, FakeRenderer> {
    SessionController::new(
        &CalibrationConfig::default(),
        store,
        FakeTracking {
            origin,
            ..FakeTracking::default()
        },
        FakeRenderer::default(),
    )
}
