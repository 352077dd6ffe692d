//! Marker records and creator roles.
//!
//! The serialized field names (`posicaoRelativa`, `qrReferencia`, `tipo`,
//! `criadoPor`) match documents already written by deployed clients and must
//! not be renamed.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::Position;

/// Visual category tag written for operator-placed markers.
pub const DEFAULT_MARKER_KIND: &str = "cubo";

/// Length of the random base36 suffix appended to marker ids.
const ID_SUFFIX_LEN: usize = 11;

/// Who is driving the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Places markers.
    #[serde(rename = "admin", alias = "operator")]
    Operator,
    /// Only views markers placed by operators.
    #[serde(rename = "user", alias = "viewer")]
    Viewer,
}

impl Role {
    /// Whether this role may create markers.
    #[must_use]
    pub const fn can_place(self) -> bool {
        matches!(self, Self::Operator)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operator => write!(f, "operator"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "operator" | "admin" => Ok(Self::Operator),
            "viewer" | "user" => Ok(Self::Viewer),
            _ => Err(format!("unknown role: {s}. Expected operator or viewer")),
        }
    }
}

/// A persisted point of interest, positioned relative to its event's anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    /// Offset from the anchor origin at creation time, in meters.
    #[serde(rename = "posicaoRelativa")]
    pub relative_position: Position,
    /// Event identifier of the anchor this marker was created under.
    #[serde(rename = "qrReferencia")]
    pub event_id: String,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub created_at_ms: i64,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "criadoPor")]
    pub created_by: Role,
}

impl Marker {
    /// Build a new marker stamped with the current time and a fresh id.
    #[must_use]
    pub fn new(event_id: impl Into<String>, relative_position: Position, created_by: Role) -> Self {
        let now_ms = Utc::now().timestamp_millis();
        Self {
            id: generate_marker_id(now_ms),
            relative_position,
            event_id: event_id.into(),
            created_at_ms: now_ms,
            kind: DEFAULT_MARKER_KIND.to_string(),
            created_by,
        }
    }

    /// Creation time, if the stored timestamp is representable.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at_ms)
    }

    #[must_use]
    pub fn belongs_to(&self, event_id: &str) -> bool {
        self.event_id == event_id
    }
}

/// Generate a marker id: base36 creation millis followed by a random base36 suffix.
#[must_use]
pub fn generate_marker_id(now_ms: i64) -> String {
    let mut id = to_base36(now_ms.max(0) as u64);
    let mut rng = rand::rng();
    for _ in 0..ID_SUFFIX_LEN {
        let digit = rng.random_range(0..36u32);
        id.push(char::from_digit(digit, 36).unwrap_or('0'));
    }
    id
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(char::from_digit((value % 36) as u32, 36).unwrap_or('0'));
        value /= 36;
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn base36_encodes_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn marker_ids_are_prefixed_by_time_and_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_marker_id(1_700_000_000_000)).collect();
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.starts_with("loyw3v28")));
        assert!(ids.iter().all(|id| id.len() == 8 + ID_SUFFIX_LEN));
    }

    #[test]
    fn role_uses_stored_names() {
        assert_eq!(serde_json::to_string(&Role::Operator).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::Viewer).unwrap(), "\"user\"");
        let parsed: Role = serde_json::from_str("\"operator\"").unwrap();
        assert_eq!(parsed, Role::Operator);
    }

    #[test]
    fn role_parses_cli_spellings() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Operator);
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!("guest".parse::<Role>().is_err());
    }

    #[test]
    fn marker_record_shape_matches_stored_documents() {
        let raw = r#"{
            "id": "lq3k2x9abc",
            "posicaoRelativa": {"x": 0.5, "y": -1.25, "z": 2.0},
            "qrReferencia": "EVENT-2024",
            "timestamp": 1700000000000,
            "tipo": "cubo",
            "criadoPor": "admin"
        }"#;
        let marker: Marker = serde_json::from_str(raw).unwrap();
        assert_eq!(marker.event_id, "EVENT-2024");
        assert_eq!(marker.relative_position, Position::new(0.5, -1.25, 2.0));
        assert_eq!(marker.created_by, Role::Operator);

        let back = serde_json::to_value(&marker).unwrap();
        let expected: serde_json::Value = serde_json::from_str(raw).unwrap();
        assert_eq!(back, expected);
    }

    #[test]
    fn new_marker_is_stamped() {
        let marker = Marker::new("EVT1", Position::new(1.0, 0.0, 0.0), Role::Operator);
        assert_eq!(marker.kind, DEFAULT_MARKER_KIND);
        assert!(marker.belongs_to("EVT1"));
        assert!(!marker.belongs_to("EVT2"));
        assert!(marker.created_at().is_some());
    }
}
