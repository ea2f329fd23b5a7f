use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::{GenericResponse, SessionStatus};
use crate::store::StoreError;

/// Errors surfaced to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    /// Operation requires an active session.
    #[error("session {session_id} is {status}, expected active")]
    InvalidState {
        session_id: String,
        status: SessionStatus,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    pub fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // storage details stay in the log, not in the response body
        let message = match &self {
            Self::Storage(e) => {
                tracing::error!("[server] [db] {}", e);
                "database operation failed".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(GenericResponse::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::not_found("session", "s1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidState {
                session_id: "s1".into(),
                status: SessionStatus::Processing,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Conflict("dup".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::BadRequest("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Storage(StoreError::Backend("down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_state_message_names_status() {
        let err = AppError::InvalidState {
            session_id: "abc".into(),
            status: SessionStatus::Completed,
        };
        assert_eq!(err.to_string(), "session abc is completed, expected active");
    }
}
