//! Persistence collaborator.
//!
//! Every write that changes a session's status is a single conditional
//! update: the status check and the write happen together, so two racing
//! callers can never both observe `active` (or both observe `processing`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{AuditEntry, Exam, ExamSession, SessionStatus, User, ViolationRecord};
use crate::reducer::AnalysisResult;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        Self::Backend(format!("bson encode: {e}"))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of the `active -> processing` compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// This caller won; carries the session as written.
    Applied(ExamSession),
    /// The session exists but was not active.
    Rejected(SessionStatus),
    Missing,
}

/// Outcome of appending a violation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Recorded,
    /// The session exists but is no longer active; nothing was stored.
    Rejected(SessionStatus),
    Missing,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    // users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    /// Flips `is_active` in a single update and returns the user as written.
    async fn toggle_user_active(&self, id: &str) -> StoreResult<Option<User>>;
    /// Removes the user together with their sessions and those sessions' violations.
    async fn delete_user(&self, id: &str) -> StoreResult<bool>;

    // exams
    async fn insert_exam(&self, exam: &Exam) -> StoreResult<()>;
    async fn find_exam(&self, id: &str) -> StoreResult<Option<Exam>>;
    async fn list_exams(&self) -> StoreResult<Vec<Exam>>;
    /// Removes the exam together with its sessions and their violations.
    async fn delete_exam(&self, id: &str) -> StoreResult<bool>;

    // sessions
    async fn insert_session(&self, session: &ExamSession) -> StoreResult<()>;
    async fn load_session(&self, id: &str) -> StoreResult<Option<ExamSession>>;
    async fn list_sessions_for_exam(&self, exam_id: &str) -> StoreResult<Vec<ExamSession>>;
    async fn delete_session(&self, id: &str) -> StoreResult<bool>;

    /// Atomically moves an `active` session to `processing` and stamps `end_time`.
    async fn begin_finalization(&self, id: &str, end_time: DateTime<Utc>)
        -> StoreResult<Transition>;

    /// Atomically writes verdict + ai_summary and moves a `processing`
    /// session to `completed`. Returns false if the session was missing or
    /// no longer `processing`.
    async fn complete_finalization(&self, id: &str, result: &AnalysisResult)
        -> StoreResult<bool>;

    // violations
    /// Stores the record only while its session is `active`. A record that
    /// was `Recorded` is always visible to a later `load_violations`
    /// issued after `begin_finalization`.
    async fn append_violation(&self, record: &ViolationRecord) -> StoreResult<Admission>;
    /// All records for the session, oldest first.
    async fn load_violations(&self, session_id: &str) -> StoreResult<Vec<ViolationRecord>>;

    // audit trail
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()>;
    /// Newest first, at most `limit` entries.
    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>>;
}
