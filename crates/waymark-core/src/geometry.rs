//! Positions in tracking space.
//!
//! Arithmetic happens on `glam::DVec3`; [`Position`] is the persisted
//! `{x, y, z}` record shape used by the marker store.

use glam::DVec3;
use serde::{Deserialize, Deserializer, Serialize};

/// A point in meters, serialized as `{"x": .., "y": .., "z": ..}`.
///
/// A `null` component reads back as `0.0`. JSON has no NaN or infinity, and
/// older writers stored those as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(deserialize_with = "null_as_zero")]
    pub x: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub y: f64,
    #[serde(deserialize_with = "null_as_zero")]
    pub z: f64,
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl Position {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn to_dvec3(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }

    /// Every component is neither NaN nor infinite, so it survives JSON.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<DVec3> for Position {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Position> for DVec3 {
    fn from(p: Position) -> Self {
        p.to_dvec3()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_xyz_object() {
        let json = serde_json::to_value(Position::new(1.5, -2.0, 0.25)).unwrap();
        assert_eq!(json, serde_json::json!({"x": 1.5, "y": -2.0, "z": 0.25}));
    }

    #[test]
    fn dvec3_conversion_preserves_components() {
        let p = Position::new(0.1, 0.2, 0.3);
        let v: DVec3 = p.into();
        assert_eq!(Position::from(v), p);
    }

    #[test]
    fn non_finite_components_are_detected() {
        assert!(Position::new(1e300, -1e300, 0.0).is_finite());
        assert!(!Position::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Position::new(0.0, f64::INFINITY, 0.0).is_finite());
        assert!(!Position::new(0.0, 0.0, f64::NEG_INFINITY).is_finite());
    }

    #[test]
    fn null_component_reads_as_zero() {
        let p: Position = serde_json::from_str(r#"{"x": null, "y": 2.0, "z": -1.0}"#).unwrap();
        assert_eq!(p, Position::new(0.0, 2.0, -1.0));
    }

    #[test]
    fn missing_component_is_rejected() {
        assert!(serde_json::from_str::<Position>(r#"{"x": 1.0, "y": 2.0}"#).is_err());
    }

    #[test]
    fn display_rounds_to_millimeters() {
        assert_eq!(Position::new(1.0, 0.0, -0.5).to_string(), "(1.000, 0.000, -0.500)");
    }
}
