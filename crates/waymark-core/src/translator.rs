//! Coordinate Translator: absolute tracking-space positions ↔ anchor-relative offsets.
//!
//! Stateless. Both directions read the origin from the same `&Anchor`, so a
//! round trip always observes one origin value. An anchor without a bound
//! origin is treated as coincident with the session origin (identity).

use glam::DVec3;
use tracing::debug;

use crate::calibration::Anchor;
use crate::error::CalibrationError;
use crate::geometry::Position;
use crate::marker::Marker;

/// Express an absolute position as an offset from the anchor origin.
#[must_use]
pub fn to_relative(anchor: &Anchor, absolute: DVec3) -> DVec3 {
    match anchor.origin_pose() {
        Some(origin) => absolute - origin,
        None => {
            debug!(event_id = %anchor.event_id(), "Origin unbound; relative == absolute");
            absolute
        }
    }
}

/// Express an anchor-relative offset in the current session's absolute frame.
#[must_use]
pub fn to_absolute(anchor: &Anchor, relative: DVec3) -> DVec3 {
    match anchor.origin_pose() {
        Some(origin) => relative + origin,
        None => {
            debug!(event_id = %anchor.event_id(), "Origin unbound; absolute == relative");
            relative
        }
    }
}

/// Absolute placement of a stored marker under `anchor`.
///
/// A marker's relative position is only meaningful under the anchor of its
/// own event; applying it to any other anchor is refused.
pub fn marker_to_absolute(anchor: &Anchor, marker: &Marker) -> Result<DVec3, CalibrationError> {
    if !marker.belongs_to(anchor.event_id()) {
        return Err(CalibrationError::EventMismatch {
            anchor_event: anchor.event_id().to_string(),
            marker_event: marker.event_id.clone(),
        });
    }
    Ok(to_absolute(anchor, marker.relative_position.to_dvec3()))
}

/// Persistable relative position for an absolute hit point.
#[must_use]
pub fn relative_position(anchor: &Anchor, absolute: DVec3) -> Position {
    Position::from(to_relative(anchor, absolute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::Role;
    use proptest::prelude::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn unbound_origin_is_identity() {
        let anchor = Anchor::new("EVENT");
        let p = DVec3::new(1.0, -2.0, 3.5);
        assert_eq!(to_relative(&anchor, p), p);
        assert_eq!(to_absolute(&anchor, p), p);
    }

    #[test]
    fn bound_origin_offsets() {
        let anchor = Anchor::with_origin("EVENT", DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(to_relative(&anchor, DVec3::new(3.0, 1.0, 0.0)), DVec3::new(1.0, 1.0, 0.0));
        assert_eq!(to_absolute(&anchor, DVec3::new(1.0, 0.0, 0.0)), DVec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn marker_under_foreign_anchor_is_refused() {
        let anchor = Anchor::with_origin("E1", DVec3::ZERO);
        let marker = Marker::new("E2", Position::new(0.0, 1.0, 0.0), Role::Operator);
        let err = marker_to_absolute(&anchor, &marker).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::EventMismatch {
                anchor_event: "E1".to_string(),
                marker_event: "E2".to_string(),
            }
        );
    }

    #[test]
    fn marker_under_own_anchor_is_placed() {
        let anchor = Anchor::with_origin("E1", DVec3::new(2.0, 0.0, 0.0));
        let marker = Marker::new("E1", Position::new(1.0, 0.0, 0.0), Role::Operator);
        assert_eq!(marker_to_absolute(&anchor, &marker).unwrap(), DVec3::new(3.0, 0.0, 0.0));
    }

    fn coord() -> impl Strategy<Value = f64> {
        -1.0e4f64..1.0e4
    }

    fn vec3() -> impl Strategy<Value = DVec3> {
        (coord(), coord(), coord()).prop_map(|(x, y, z)| DVec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn round_trip_with_bound_origin(origin in vec3(), p in vec3()) {
            let anchor = Anchor::with_origin("EVENT", origin);
            let back = to_absolute(&anchor, to_relative(&anchor, p));
            prop_assert!(back.abs_diff_eq(p, TOLERANCE), "p={:?} back={:?}", p, back);
        }

        #[test]
        fn round_trip_without_origin(p in vec3()) {
            let anchor = Anchor::new("EVENT");
            let back = to_absolute(&anchor, to_relative(&anchor, p));
            prop_assert_eq!(back, p);
        }

        #[test]
        fn relative_offsets_survive_a_new_session_origin(
            first_origin in vec3(),
            second_origin in vec3(),
            p in vec3(),
        ) {
            // Same event, independent sessions: the marker keeps its offset
            // from whichever origin the session binds.
            let creating = Anchor::with_origin("EVENT", first_origin);
            let rel = relative_position(&creating, p);
            let viewing = Anchor::with_origin("EVENT", second_origin);
            let placed = to_absolute(&viewing, rel.to_dvec3());
            prop_assert!((placed - second_origin).abs_diff_eq(p - first_origin, TOLERANCE));
        }
    }
}
