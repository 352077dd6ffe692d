//! Marker Reconstruction Service.
//!
//! Rebuilds the displayed markers for the current event by translating each
//! stored anchor-relative position into the active session's absolute frame.
//! Stored markers are never mutated; running it twice yields the same
//! placements.

use glam::DVec3;
use tracing::{debug, info};

use crate::calibration::Anchor;
use crate::collaborators::SceneRenderer;
use crate::marker::Marker;
use crate::store::MarkerStore;
use crate::translator::marker_to_absolute;

/// One instruction for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Absolute position in the current tracking session.
    pub position: DVec3,
    pub marker: Marker,
    /// Zero-based index within the event's markers, in stored order.
    pub variation_index: usize,
}

/// Placements for every marker of `anchor`'s event, in stored order.
///
/// Markers of other events are skipped: [`marker_to_absolute`] refuses them.
#[must_use]
pub fn reconstruct(anchor: &Anchor, all_markers: &[Marker]) -> Vec<Placement> {
    all_markers
        .iter()
        .filter_map(|marker| {
            marker_to_absolute(anchor, marker)
                .ok()
                .map(|position| (position, marker))
        })
        .enumerate()
        .map(|(variation_index, (position, marker))| Placement {
            position,
            marker: marker.clone(),
            variation_index,
        })
        .collect()
}

/// Load, clear, and re-place: the full reconstruction pass against collaborators.
///
/// The store is read before the renderer is touched, so a storage failure
/// leaves the current display as it was. Returns the number of placements.
pub fn reconstruct_into<S, R>(
    anchor: &Anchor,
    store: &S,
    renderer: &mut R,
) -> crate::Result<usize>
where
    S: MarkerStore + ?Sized,
    R: SceneRenderer + ?Sized,
{
    let markers = store.load_all_markers()?;
    let placements = reconstruct(anchor, &markers);

    renderer.clear_placements();
    for placement in &placements {
        debug!(
            marker_id = %placement.marker.id,
            index = placement.variation_index,
            position = ?placement.position,
            "Placing marker"
        );
        renderer.place(placement);
    }

    info!(
        event_id = %anchor.event_id(),
        placed = placements.len(),
        stored = markers.len(),
        "Reconstruction complete"
    );
    Ok(placements.len())
}
