//! In-process store backed by `DashMap`.
//!
//! Status transitions run under the shard write lock held by `get_mut`, which
//! gives the same single-record atomicity the MongoDB store gets from
//! `find_one_and_update`. Violation appends hold the session's shard read
//! lock while pushing, so they cannot interleave with `begin_finalization`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::RwLock;

use super::{Admission, SessionStore, StoreError, StoreResult, Transition};
use crate::models::{AuditEntry, Exam, ExamSession, SessionStatus, User, ViolationRecord};
use crate::reducer::AnalysisResult;

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    exams: DashMap<String, Exam>,
    sessions: DashMap<String, ExamSession>,
    violations: DashMap<String, Vec<ViolationRecord>>, // keyed by session id
    audit: RwLock<Vec<AuditEntry>>,                    // append order
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn drop_sessions_where<F>(&self, pred: F)
    where
        F: Fn(&ExamSession) -> bool,
    {
        let doomed: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| pred(s.value()))
            .map(|s| s.key().clone())
            .collect();
        for id in doomed {
            self.sessions.remove(&id);
            self.violations.remove(&id);
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.value().clone()))
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn toggle_user_active(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get_mut(id).map(|mut u| {
            u.is_active = !u.is_active;
            u.value().clone()
        }))
    }

    async fn delete_user(&self, id: &str) -> StoreResult<bool> {
        if self.users.remove(id).is_none() {
            return Ok(false);
        }
        self.drop_sessions_where(|s| s.student_id == id);
        Ok(true)
    }

    async fn insert_exam(&self, exam: &Exam) -> StoreResult<()> {
        self.exams.insert(exam.id.clone(), exam.clone());
        Ok(())
    }

    async fn find_exam(&self, id: &str) -> StoreResult<Option<Exam>> {
        Ok(self.exams.get(id).map(|e| e.value().clone()))
    }

    async fn list_exams(&self) -> StoreResult<Vec<Exam>> {
        let mut exams: Vec<Exam> = self.exams.iter().map(|e| e.value().clone()).collect();
        exams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(exams)
    }

    async fn delete_exam(&self, id: &str) -> StoreResult<bool> {
        if self.exams.remove(id).is_none() {
            return Ok(false);
        }
        self.drop_sessions_where(|s| s.exam_id == id);
        Ok(true)
    }

    async fn insert_session(&self, session: &ExamSession) -> StoreResult<()> {
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load_session(&self, id: &str) -> StoreResult<Option<ExamSession>> {
        Ok(self.sessions.get(id).map(|s| s.value().clone()))
    }

    async fn list_sessions_for_exam(&self, exam_id: &str) -> StoreResult<Vec<ExamSession>> {
        let mut sessions: Vec<ExamSession> = self
            .sessions
            .iter()
            .filter(|s| s.exam_id == exam_id)
            .map(|s| s.value().clone())
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> StoreResult<bool> {
        let existed = self.sessions.remove(id).is_some();
        self.violations.remove(id);
        Ok(existed)
    }

    async fn begin_finalization(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        let Some(mut session) = self.sessions.get_mut(id) else {
            return Ok(Transition::Missing);
        };
        if session.status != SessionStatus::Active {
            return Ok(Transition::Rejected(session.status));
        }
        session.end_time = Some(end_time);
        session.status = SessionStatus::Processing;
        Ok(Transition::Applied(session.value().clone()))
    }

    async fn complete_finalization(
        &self,
        id: &str,
        result: &AnalysisResult,
    ) -> StoreResult<bool> {
        let Some(mut session) = self.sessions.get_mut(id) else {
            return Ok(false);
        };
        if session.status != SessionStatus::Processing {
            return Ok(false);
        }
        session.verdict = result.verdict;
        session.ai_summary = Some(result.summary.clone());
        session.status = SessionStatus::Completed;
        Ok(true)
    }

    async fn append_violation(&self, record: &ViolationRecord) -> StoreResult<Admission> {
        // held until the push lands; begin_finalization needs the write lock
        let Some(session) = self.sessions.get(&record.session_id) else {
            return Ok(Admission::Missing);
        };
        if session.status != SessionStatus::Active {
            return Ok(Admission::Rejected(session.status));
        }
        self.violations
            .entry(record.session_id.clone())
            .or_default()
            .push(record.clone());
        drop(session);
        Ok(Admission::Recorded)
    }

    async fn load_violations(&self, session_id: &str) -> StoreResult<Vec<ViolationRecord>> {
        let mut records = self
            .violations
            .get(session_id)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(records)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.audit
            .write()
            .map_err(|_| StoreError::Backend("audit log lock poisoned".into()))?
            .push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let audit = self
            .audit
            .read()
            .map_err(|_| StoreError::Backend("audit log lock poisoned".into()))?;
        Ok(audit.iter().rev().take(limit).cloned().collect())
    }
}
