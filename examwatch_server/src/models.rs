use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::severity::ViolationKind;

/// Version tag written into every `ai_summary` blob.
pub const ANALYSIS_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Processing,
    Completed,
    Failed, // only reachable through manual proctor edits
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pending,
    Clean,
    Suspicious,
    Warning,
    Violation,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Clean => "clean",
            Self::Suspicious => "suspicious",
            Self::Warning => "warning",
            Self::Violation => "violation",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted `ai_summary` shape. Dashboards read this blob directly, so field
/// names and types are part of the external contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSummary {
    pub total_violations: u64,
    pub total_severity: u64,
    pub violation_types: Vec<String>,
    pub type_counts: BTreeMap<String, u64>,
    pub analysis_version: String,
}

/// A single flagged proctoring event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub timestamp: DateTime<Utc>,
    pub severity_score: Option<u32>, // None reads as 0 in the reducer
    pub confidence: Option<f64>,
    pub evidence_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: String,
    pub exam_id: String,
    pub student_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub verdict: Verdict,
    pub ai_summary: Option<AiSummary>,
}

impl ExamSession {
    pub fn start(exam_id: String, student_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            exam_id,
            student_id,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
            verdict: Verdict::Pending,
            ai_summary: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Teacher,
    Proctor,
    Admin,
}

impl UserRole {
    /// Unknown or missing roles fall back to `Student`.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Self::Admin,
            Some("teacher") => Self::Teacher,
            Some("proctor") => Self::Proctor,
            _ => Self::Student,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamConfig {
    pub strictness: String,
    pub allow_tab_switch: bool,
    pub record_audio: bool,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            strictness: "medium".to_string(),
            allow_tab_switch: false,
            record_audio: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    pub title: String,
    pub created_by: Option<String>,
    pub duration_minutes: u32,
    pub config: ExamConfig,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One admin-visible audit trail entry. The email is captured at write time
/// so entries stay readable after the user is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: &str, user: Option<&User>, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.map(|u| u.id.clone()),
            user_email: user.map(|u| u.email.clone()),
            action: action.to_string(),
            details,
            created_at: Utc::now(),
        }
    }
}

// ---- request / response bodies ----

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    #[serde(alias = "name")]
    pub full_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateExamRequest {
    pub title: String,
    pub created_by: Option<String>,
    pub duration_minutes: Option<u32>,
    pub config: Option<ExamConfig>,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub student_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ViolationReport {
    pub session_id: String,
    pub violation_type: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub confidence: Option<f64>,
    pub evidence_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViolationReceipt {
    pub status: String,
    pub violation_id: String,
    pub severity_score: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenericResponse {
    pub status: String,
    pub message: String,
}

impl GenericResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
