use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Document},
    options::{
        ClientOptions, FindOneAndUpdateOptions, IndexOptions, ResolverConfig, ReturnDocument,
    },
    Client, Collection, Database, IndexModel,
};

use super::{Admission, SessionStore, StoreResult, Transition};
use crate::models::{AuditEntry, Exam, ExamSession, SessionStatus, User, ViolationRecord};
use crate::reducer::AnalysisResult;

const USERS: &str = "users";
const EXAMS: &str = "exams";
const SESSIONS: &str = "exam_sessions";
const VIOLATIONS: &str = "violations";
const AUDIT: &str = "audit_logs";

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, db_name: &str) -> StoreResult<Self> {
        let options =
            ClientOptions::parse_with_resolver_config(uri, ResolverConfig::cloudflare()).await?;
        let client = Client::with_options(options)?;
        let store = Self {
            db: client.database(db_name),
        };
        store.ensure_indexes().await?;
        tracing::info!("[store] connected to mongodb database {}", db_name);
        Ok(store)
    }

    // Lookups go through the string `id`, not mongo's `_id`. Timestamps are
    // stored as RFC 3339 strings with variable precision, so ordering is done
    // client-side rather than with a server sort.
    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique_id = || {
            IndexModel::builder()
                .keys(doc! { "id": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        self.users().create_index(unique_id(), None).await?;
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
                None,
            )
            .await?;
        self.exams().create_index(unique_id(), None).await?;
        self.sessions().create_index(unique_id(), None).await?;
        self.sessions()
            .create_index(
                IndexModel::builder().keys(doc! { "exam_id": 1 }).build(),
                None,
            )
            .await?;
        self.violations()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "session_id": 1 })
                    .build(),
                None,
            )
            .await?;
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn exams(&self) -> Collection<Exam> {
        self.db.collection(EXAMS)
    }

    fn sessions(&self) -> Collection<ExamSession> {
        self.db.collection(SESSIONS)
    }

    fn violations(&self) -> Collection<ViolationRecord> {
        self.db.collection(VIOLATIONS)
    }

    fn audit(&self) -> Collection<AuditEntry> {
        self.db.collection(AUDIT)
    }

    async fn session_status(&self, id: &str) -> StoreResult<Option<SessionStatus>> {
        Ok(self.load_session(id).await?.map(|s| s.status))
    }

    async fn cascade_sessions(&self, filter: Document) -> StoreResult<()> {
        let ids: Vec<String> = self
            .sessions()
            .find(filter.clone(), None)
            .await?
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }
        self.violations()
            .delete_many(doc! { "session_id": { "$in": ids } }, None)
            .await?;
        self.sessions().delete_many(filter, None).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.users().insert_one(user, None).await?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }, None).await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self.users().find(None, None).await?.try_collect().await?;
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn toggle_user_active(&self, id: &str) -> StoreResult<Option<User>> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        // pipeline update: the flip reads the stored value server-side
        let flip = vec![doc! { "$set": { "is_active": { "$not": ["$is_active"] } } }];
        Ok(self
            .users()
            .find_one_and_update(doc! { "id": id }, flip, options)
            .await?)
    }

    async fn delete_user(&self, id: &str) -> StoreResult<bool> {
        let deleted = self.users().delete_one(doc! { "id": id }, None).await?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }
        self.cascade_sessions(doc! { "student_id": id }).await?;
        Ok(true)
    }

    async fn insert_exam(&self, exam: &Exam) -> StoreResult<()> {
        self.exams().insert_one(exam, None).await?;
        Ok(())
    }

    async fn find_exam(&self, id: &str) -> StoreResult<Option<Exam>> {
        Ok(self.exams().find_one(doc! { "id": id }, None).await?)
    }

    async fn list_exams(&self) -> StoreResult<Vec<Exam>> {
        let mut exams: Vec<Exam> = self.exams().find(None, None).await?.try_collect().await?;
        exams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(exams)
    }

    async fn delete_exam(&self, id: &str) -> StoreResult<bool> {
        let deleted = self.exams().delete_one(doc! { "id": id }, None).await?;
        if deleted.deleted_count == 0 {
            return Ok(false);
        }
        self.cascade_sessions(doc! { "exam_id": id }).await?;
        Ok(true)
    }

    async fn insert_session(&self, session: &ExamSession) -> StoreResult<()> {
        self.sessions().insert_one(session, None).await?;
        Ok(())
    }

    async fn load_session(&self, id: &str) -> StoreResult<Option<ExamSession>> {
        Ok(self.sessions().find_one(doc! { "id": id }, None).await?)
    }

    async fn list_sessions_for_exam(&self, exam_id: &str) -> StoreResult<Vec<ExamSession>> {
        let mut sessions: Vec<ExamSession> = self
            .sessions()
            .find(doc! { "exam_id": exam_id }, None)
            .await?
            .try_collect()
            .await?;
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> StoreResult<bool> {
        let deleted = self.sessions().delete_one(doc! { "id": id }, None).await?;
        self.violations()
            .delete_many(doc! { "session_id": id }, None)
            .await?;
        Ok(deleted.deleted_count > 0)
    }

    async fn begin_finalization(
        &self,
        id: &str,
        end_time: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        // status check and write in one server-side operation
        let updated = self
            .sessions()
            .find_one_and_update(
                doc! { "id": id, "status": SessionStatus::Active.as_str() },
                doc! { "$set": {
                    "status": SessionStatus::Processing.as_str(),
                    "end_time": to_bson(&end_time)?,
                } },
                options,
            )
            .await?;

        if let Some(session) = updated {
            return Ok(Transition::Applied(session));
        }
        match self.load_session(id).await? {
            Some(existing) => Ok(Transition::Rejected(existing.status)),
            None => Ok(Transition::Missing),
        }
    }

    async fn complete_finalization(
        &self,
        id: &str,
        result: &AnalysisResult,
    ) -> StoreResult<bool> {
        let outcome = self
            .sessions()
            .update_one(
                doc! { "id": id, "status": SessionStatus::Processing.as_str() },
                doc! { "$set": {
                    "status": SessionStatus::Completed.as_str(),
                    "verdict": result.verdict.as_str(),
                    "ai_summary": to_bson(&result.summary)?,
                } },
                None,
            )
            .await?;
        Ok(outcome.matched_count == 1)
    }

    // Without a multi-document transaction the status check and the insert
    // are separate operations. The record goes in first and the status is
    // re-read afterwards: if the session left `active` in between, the record
    // is withdrawn and the report rejected, so a `Recorded` answer always
    // means the insert landed before `begin_finalization`.
    async fn append_violation(&self, record: &ViolationRecord) -> StoreResult<Admission> {
        match self.session_status(&record.session_id).await? {
            None => return Ok(Admission::Missing),
            Some(SessionStatus::Active) => {}
            Some(status) => return Ok(Admission::Rejected(status)),
        }

        self.violations().insert_one(record, None).await?;

        match self.session_status(&record.session_id).await? {
            Some(SessionStatus::Active) => Ok(Admission::Recorded),
            after => {
                self.violations()
                    .delete_one(doc! { "id": record.id.as_str() }, None)
                    .await?;
                tracing::warn!(
                    "[store] withdrew violation {} after session {} left active",
                    record.id,
                    record.session_id
                );
                Ok(match after {
                    Some(status) => Admission::Rejected(status),
                    None => Admission::Missing,
                })
            }
        }
    }

    async fn load_violations(&self, session_id: &str) -> StoreResult<Vec<ViolationRecord>> {
        let mut records: Vec<ViolationRecord> = self
            .violations()
            .find(doc! { "session_id": session_id }, None)
            .await?
            .try_collect()
            .await?;
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(records)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        self.audit().insert_one(entry, None).await?;
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> StoreResult<Vec<AuditEntry>> {
        let mut entries: Vec<AuditEntry> = self.audit().find(None, None).await?.try_collect().await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}
