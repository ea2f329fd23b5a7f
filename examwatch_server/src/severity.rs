//! Violation-type tags and their severity weights.
//!
//! The weights are configuration: a deployment can replace or extend them via
//! `SeverityTable::with_overrides` without the reducer noticing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Weight for any tag the table has no entry for.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Tags reported by proctoring clients. New client-side detectors show up as
/// `Other` until they get a variant of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationKind {
    GazeAway,
    TabSwitch,
    BookDetected,
    LaptopDetected,
    VoiceDetected,
    PhoneDetected,
    FaceMissing,
    MultipleFaces,
    FaceSubstitution,
    ObjectDetected,
    Other(String),
}

impl ViolationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::GazeAway => "gaze_away",
            Self::TabSwitch => "tab_switch",
            Self::BookDetected => "book_detected",
            Self::LaptopDetected => "laptop_detected",
            Self::VoiceDetected => "voice_detected",
            Self::PhoneDetected => "phone_detected",
            Self::FaceMissing => "face_missing",
            Self::MultipleFaces => "multiple_faces",
            Self::FaceSubstitution => "face_substitution",
            Self::ObjectDetected => "object_detected",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for ViolationKind {
    fn from(tag: &str) -> Self {
        match tag {
            "gaze_away" => Self::GazeAway,
            "tab_switch" => Self::TabSwitch,
            "book_detected" => Self::BookDetected,
            "laptop_detected" => Self::LaptopDetected,
            "voice_detected" => Self::VoiceDetected,
            "phone_detected" => Self::PhoneDetected,
            "face_missing" => Self::FaceMissing,
            "multiple_faces" => Self::MultipleFaces,
            "face_substitution" => Self::FaceSubstitution,
            "object_detected" => Self::ObjectDetected,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for ViolationKind {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<ViolationKind> for String {
    fn from(kind: ViolationKind) -> Self {
        match kind {
            ViolationKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityTable {
    weights: HashMap<String, u32>,
}

impl Default for SeverityTable {
    fn default() -> Self {
        let weights = [
            ("gaze_away", 1),
            ("tab_switch", 2),
            ("book_detected", 3),
            ("laptop_detected", 3),
            ("voice_detected", 3),
            ("object_detected", 3),
            ("phone_detected", 4),
            ("face_missing", 4),
            ("multiple_faces", 5),
            ("face_substitution", 5),
        ]
        .into_iter()
        .map(|(tag, w)| (tag.to_string(), w))
        .collect();
        Self { weights }
    }
}

impl SeverityTable {
    /// Table with no entries: every tag weighs `DEFAULT_WEIGHT`.
    pub fn empty() -> Self {
        Self {
            weights: HashMap::new(),
        }
    }

    pub fn with_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        for (tag, weight) in overrides {
            self.weights.insert(tag.into(), weight);
        }
        self
    }

    /// Total lookup. Never fails; unknown tags weigh `DEFAULT_WEIGHT`.
    pub fn severity_of(&self, kind: &ViolationKind) -> u32 {
        self.weights
            .get(kind.as_str())
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }

    pub fn severity_of_tag(&self, tag: &str) -> u32 {
        self.weights.get(tag).copied().unwrap_or(DEFAULT_WEIGHT)
    }
}

/// Lookup against the built-in weights.
pub fn severity_of(tag: &str) -> u32 {
    SeverityTable::default().severity_of_tag(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_weights() {
        assert_eq!(severity_of("gaze_away"), 1);
        assert_eq!(severity_of("tab_switch"), 2);
        assert_eq!(severity_of("book_detected"), 3);
        assert_eq!(severity_of("laptop_detected"), 3);
        assert_eq!(severity_of("voice_detected"), 3);
        assert_eq!(severity_of("phone_detected"), 4);
        assert_eq!(severity_of("face_missing"), 4);
        assert_eq!(severity_of("multiple_faces"), 5);
        assert_eq!(severity_of("face_substitution"), 5);
    }

    #[test]
    fn unknown_tags_default_to_one() {
        assert_eq!(severity_of("earbuds_detected"), DEFAULT_WEIGHT);
        assert_eq!(severity_of(""), DEFAULT_WEIGHT);

        let table = SeverityTable::default();
        let kind = ViolationKind::from("smartwatch_detected");
        assert_eq!(kind, ViolationKind::Other("smartwatch_detected".into()));
        assert_eq!(table.severity_of(&kind), DEFAULT_WEIGHT);
    }

    #[test]
    fn overrides_replace_and_extend() {
        let table = SeverityTable::default()
            .with_overrides([("phone_detected", 7), ("smartwatch_detected", 2)]);
        assert_eq!(table.severity_of(&ViolationKind::PhoneDetected), 7);
        assert_eq!(table.severity_of_tag("smartwatch_detected"), 2);
        assert_eq!(table.severity_of(&ViolationKind::GazeAway), 1);

        let bare = SeverityTable::empty();
        assert_eq!(bare.severity_of(&ViolationKind::MultipleFaces), DEFAULT_WEIGHT);
    }

    #[test]
    fn kind_tags_round_trip_through_serde() {
        let json = serde_json::to_string(&ViolationKind::FaceSubstitution).unwrap();
        assert_eq!(json, "\"face_substitution\"");

        let other: ViolationKind = serde_json::from_str("\"hand_signal\"").unwrap();
        assert_eq!(other.as_str(), "hand_signal");
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"hand_signal\"");
    }
}
