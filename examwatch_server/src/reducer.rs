//! Verdict reducer: folds a session's violation records into one verdict.
//!
//! `VerdictReducer::reduce` is a pure function of its input. It does no I/O,
//! never looks at session status and never mutates the records it is given.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{AiSummary, Verdict, ViolationRecord, ANALYSIS_VERSION};

pub const DEFAULT_SUSPICIOUS_THRESHOLD: u64 = 5;
pub const DEFAULT_WARNING_THRESHOLD: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("suspicious threshold ({suspicious}) must be positive and below the warning threshold ({warning})")]
pub struct ThresholdError {
    pub suspicious: u64,
    pub warning: u64,
}

/// Ascending severity cutoffs. Both bounds are inclusive on the lower verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    suspicious: u64,
    warning: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspicious: DEFAULT_SUSPICIOUS_THRESHOLD,
            warning: DEFAULT_WARNING_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(suspicious: u64, warning: u64) -> Result<Self, ThresholdError> {
        if suspicious == 0 || suspicious >= warning {
            return Err(ThresholdError {
                suspicious,
                warning,
            });
        }
        Ok(Self {
            suspicious,
            warning,
        })
    }

    pub fn suspicious(&self) -> u64 {
        self.suspicious
    }

    pub fn warning(&self) -> u64 {
        self.warning
    }

    pub fn classify(&self, total_severity: u64) -> Verdict {
        match total_severity {
            0 => Verdict::Clean,
            t if t <= self.suspicious => Verdict::Suspicious,
            t if t <= self.warning => Verdict::Warning,
            _ => Verdict::Violation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub summary: AiSummary,
}

#[derive(Debug, Clone, Default)]
pub struct VerdictReducer {
    thresholds: Thresholds,
}

impl VerdictReducer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn reduce(&self, records: &[ViolationRecord]) -> AnalysisResult {
        let mut total_severity: u64 = 0;
        let mut type_counts: BTreeMap<String, u64> = BTreeMap::new();

        for record in records {
            total_severity += u64::from(record.severity_score.unwrap_or(0));
            *type_counts
                .entry(record.kind.as_str().to_string())
                .or_insert(0) += 1;
        }

        // keys are already unique and sorted
        let violation_types = type_counts.keys().cloned().collect();

        AnalysisResult {
            verdict: self.thresholds.classify(total_severity),
            summary: AiSummary {
                total_violations: records.len() as u64,
                total_severity,
                violation_types,
                type_counts,
                analysis_version: ANALYSIS_VERSION.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::{severity_of, ViolationKind};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn record(n: usize, tag: &str) -> ViolationRecord {
        ViolationRecord {
            id: format!("v{n}"),
            session_id: "s1".to_string(),
            kind: ViolationKind::from(tag),
            timestamp: Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap(),
            severity_score: Some(severity_of(tag)),
            confidence: Some(0.9),
            evidence_url: None,
        }
    }

    fn records(tags: &[&str]) -> Vec<ViolationRecord> {
        tags.iter().enumerate().map(|(i, t)| record(i, t)).collect()
    }

    fn reduce(tags: &[&str]) -> AnalysisResult {
        VerdictReducer::default().reduce(&records(tags))
    }

    #[test]
    fn empty_session_is_clean() {
        let result = reduce(&[]);
        assert_eq!(result.verdict, Verdict::Clean);
        assert_eq!(result.summary.total_severity, 0);
        assert_eq!(result.summary.total_violations, 0);
        assert!(result.summary.violation_types.is_empty());
        assert!(result.summary.type_counts.is_empty());
        assert_eq!(result.summary.analysis_version, "1.0");
    }

    #[test]
    fn single_gaze_away_is_suspicious() {
        let result = reduce(&["gaze_away"]);
        assert_eq!(result.summary.total_severity, 1);
        assert_eq!(result.verdict, Verdict::Suspicious);
    }

    #[test]
    fn tab_switches_and_voice_is_warning() {
        let result = reduce(&["tab_switch", "tab_switch", "voice_detected"]);
        assert_eq!(result.summary.total_severity, 7);
        assert_eq!(result.verdict, Verdict::Warning);
        assert_eq!(result.summary.type_counts["tab_switch"], 2);
        assert_eq!(result.summary.type_counts["voice_detected"], 1);
        assert_eq!(
            result.summary.violation_types,
            vec!["tab_switch".to_string(), "voice_detected".to_string()]
        );
    }

    #[test]
    fn warning_upper_bound_is_inclusive() {
        let result = reduce(&["multiple_faces", "face_substitution"]);
        assert_eq!(result.summary.total_severity, 10);
        assert_eq!(result.verdict, Verdict::Warning);
    }

    #[test]
    fn heavy_session_is_violation() {
        let result = reduce(&["multiple_faces", "multiple_faces", "phone_detected"]);
        assert_eq!(result.summary.total_severity, 14);
        assert_eq!(result.summary.total_violations, 3);
        assert_eq!(result.verdict, Verdict::Violation);
    }

    #[test]
    fn classify_boundaries() {
        let t = Thresholds::default();
        assert_eq!(t.classify(0), Verdict::Clean);
        assert_eq!(t.classify(5), Verdict::Suspicious);
        assert_eq!(t.classify(6), Verdict::Warning);
        assert_eq!(t.classify(10), Verdict::Warning);
        assert_eq!(t.classify(11), Verdict::Violation);
    }

    #[test]
    fn custom_thresholds_shift_cutoffs() {
        let reducer = VerdictReducer::new(Thresholds::new(3, 8).unwrap());
        let result = reducer.reduce(&records(&["phone_detected"]));
        assert_eq!(result.verdict, Verdict::Warning);
    }

    #[test]
    fn thresholds_must_ascend() {
        assert_eq!(
            Thresholds::new(10, 5),
            Err(ThresholdError {
                suspicious: 10,
                warning: 5
            })
        );
        assert!(Thresholds::new(5, 5).is_err());
        assert!(Thresholds::new(0, 5).is_err());
    }

    #[test]
    fn missing_severity_counts_as_zero() {
        let mut recs = records(&["gaze_away", "phone_detected"]);
        recs[1].severity_score = None;
        let result = VerdictReducer::default().reduce(&recs);
        assert_eq!(result.summary.total_severity, 1);
        assert_eq!(result.summary.total_violations, 2);
        assert_eq!(result.summary.type_counts["phone_detected"], 1);
    }

    #[test]
    fn summary_json_shape_is_stable() {
        let result = reduce(&["tab_switch", "gaze_away", "tab_switch"]);
        let json = serde_json::to_value(&result.summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "total_violations": 3,
                "total_severity": 5,
                "violation_types": ["gaze_away", "tab_switch"],
                "type_counts": {"gaze_away": 1, "tab_switch": 2},
                "analysis_version": "1.0",
            })
        );
    }

    const TAGS: &[&str] = &[
        "gaze_away",
        "tab_switch",
        "book_detected",
        "laptop_detected",
        "voice_detected",
        "phone_detected",
        "face_missing",
        "multiple_faces",
        "face_substitution",
        "unlisted_tag",
    ];

    fn tag_list() -> impl Strategy<Value = Vec<&'static str>> {
        prop::collection::vec(prop::sample::select(TAGS), 0..40)
    }

    proptest! {
        #[test]
        fn total_is_sum_of_weights(tags in tag_list()) {
            let result = reduce(&tags);
            let expected: u64 = tags.iter().map(|t| u64::from(severity_of(t))).sum();
            prop_assert_eq!(result.summary.total_severity, expected);
            prop_assert_eq!(result.summary.total_violations, tags.len() as u64);
        }

        #[test]
        fn order_does_not_matter(tags in tag_list(), seed in any::<u64>()) {
            let mut shuffled = records(&tags);
            // deterministic rotation + reverse stands in for a shuffle
            if !shuffled.is_empty() {
                let k = (seed as usize) % shuffled.len();
                shuffled.rotate_left(k);
                shuffled.reverse();
            }
            let reducer = VerdictReducer::default();
            prop_assert_eq!(reducer.reduce(&records(&tags)), reducer.reduce(&shuffled));
        }

        #[test]
        fn rerun_is_byte_identical(tags in tag_list()) {
            let recs = records(&tags);
            let before = recs.clone();
            let reducer = VerdictReducer::default();
            let first = serde_json::to_vec(&reducer.reduce(&recs)).unwrap();
            let second = serde_json::to_vec(&reducer.reduce(&recs)).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(recs, before);
        }
    }
}
