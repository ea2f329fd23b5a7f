//! Session finalization: `active -> processing -> completed`.
//!
//! `finish` performs the synchronous half: the conditional status write. Only
//! the caller that wins that write schedules the background half, which loads
//! the violation records, runs the reducer and persists the verdict. The
//! background task is detached from the request; its failures are logged and
//! leave the session in `processing`.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::models::ExamSession;
use crate::reducer::{AnalysisResult, VerdictReducer};
use crate::store::{SessionStore, StoreError, Transition};

#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("session {0} disappeared before scoring")]
    SessionVanished(String),

    #[error("session {0} is no longer processing")]
    NotProcessing(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Returned to the one caller whose finish request took effect.
pub struct FinishTicket {
    pub session: ExamSession,
    /// Background scoring task. Dropping it detaches the task.
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct SessionFinalizer {
    store: Arc<dyn SessionStore>,
    reducer: VerdictReducer,
}

impl SessionFinalizer {
    pub fn new(store: Arc<dyn SessionStore>, reducer: VerdictReducer) -> Self {
        Self { store, reducer }
    }

    /// Marks the session `processing` and schedules scoring.
    ///
    /// The status write is awaited before the task is spawned, so the task
    /// never reads violations for a session that still looks active.
    pub async fn finish(&self, session_id: &str) -> Result<FinishTicket, AppError> {
        match self.store.begin_finalization(session_id, Utc::now()).await? {
            Transition::Applied(session) => {
                tracing::info!("[finalizer] session {} marked processing", session_id);
                let task = self.spawn_scoring(session_id.to_string());
                Ok(FinishTicket { session, task })
            }
            Transition::Rejected(status) => Err(AppError::InvalidState {
                session_id: session_id.to_string(),
                status,
            }),
            Transition::Missing => Err(AppError::not_found("session", session_id)),
        }
    }

    fn spawn_scoring(&self, session_id: String) -> JoinHandle<()> {
        let finalizer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = finalizer.score(&session_id).await {
                // nothing retries this; the session stays in `processing`
                tracing::error!("[finalizer] scoring failed for session {}: {}", session_id, e);
            }
        })
    }

    /// Loads, reduces and persists. Exposed for reconciliation tooling and tests.
    pub async fn score(&self, session_id: &str) -> Result<AnalysisResult, FinalizeError> {
        if self.store.load_session(session_id).await?.is_none() {
            return Err(FinalizeError::SessionVanished(session_id.to_string()));
        }

        let records = self.store.load_violations(session_id).await?;
        let result = self.reducer.reduce(&records);

        if !self.store.complete_finalization(session_id, &result).await? {
            return Err(FinalizeError::NotProcessing(session_id.to_string()));
        }

        tracing::info!(
            "[finalizer] session {} scored {} (severity {}, {} violations)",
            session_id,
            result.verdict,
            result.summary.total_severity,
            result.summary.total_violations
        );
        Ok(result)
    }
}
