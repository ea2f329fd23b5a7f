use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    AuditEntry, CreateExamRequest, CreateUserRequest, Exam, ExamSession, GenericResponse,
    StartSessionRequest, User, UserRole, ViolationReceipt, ViolationRecord, ViolationReport,
};
use crate::severity::ViolationKind;
use crate::store::Admission;
use crate::AppState;

type ApiResult<T> = Result<T, AppError>;

/// Entries returned by `GET /logs`.
pub const AUDIT_PAGE_SIZE: usize = 50;

// The audited action has already happened, so a failed audit write is logged
// rather than turned into an error response.
async fn record_audit(state: &AppState, entry: AuditEntry) {
    if let Err(e) = state.store.append_audit(&entry).await {
        tracing::warn!("[server] audit entry {} not written: {}", entry.action, e);
    }
}

pub async fn health_checker() -> impl IntoResponse {
    const MESSAGE: &str = "examwatch server is running";
    Json(GenericResponse::success(MESSAGE))
}

// ---- users ----

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    // stored lowercased so lookups agree across stores
    let email = req.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::BadRequest("email is required".into()));
    }
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("User already exists".into()));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        full_name: req.full_name,
        role: UserRole::normalize(req.role.as_deref()),
        is_active: true,
        created_at: Utc::now(),
    };
    state.store.insert_user(&user).await?;
    tracing::info!("[server] user {} created with role {:?}", user.id, user.role);
    record_audit(
        &state,
        AuditEntry::new(
            "user.created",
            Some(&user),
            serde_json::json!({ "email": user.email, "role": user.role }),
        ),
    )
    .await;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.store.list_users().await?))
}

pub async fn toggle_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<User>> {
    let updated = state
        .store
        .toggle_user_active(&user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", &user_id))?;
    record_audit(
        &state,
        AuditEntry::new(
            "user.toggled",
            Some(&updated),
            serde_json::json!({ "email": updated.email, "is_active": updated.is_active }),
        ),
    )
    .await;
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // read first so the audit entry can carry the email
    let user = state.store.find_user(&user_id).await?;
    if !state.store.delete_user(&user_id).await? {
        return Err(AppError::not_found("user", &user_id));
    }
    tracing::info!("[server] user {} deleted", user_id);
    record_audit(
        &state,
        AuditEntry::new(
            "user.deleted",
            user.as_ref(),
            serde_json::json!({
                "email": user.as_ref().map(|u| &u.email),
                "role": user.as_ref().map(|u| u.role),
            }),
        ),
    )
    .await;
    Ok(Json(serde_json::json!({ "status": "deleted", "id": user_id })))
}

// ---- exams ----

pub async fn create_exam(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateExamRequest>,
) -> ApiResult<(StatusCode, Json<Exam>)> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }
    let exam = Exam {
        id: Uuid::new_v4().to_string(),
        title,
        created_by: req.created_by,
        duration_minutes: req.duration_minutes.unwrap_or(60),
        config: req.config.unwrap_or_default(),
        is_active: true,
        created_at: Utc::now(),
    };
    state.store.insert_exam(&exam).await?;
    tracing::info!("[server] exam {} created", exam.id);
    Ok((StatusCode::CREATED, Json(exam)))
}

pub async fn list_exams(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Exam>>> {
    Ok(Json(state.store.list_exams().await?))
}

pub async fn get_exam(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
) -> ApiResult<Json<Exam>> {
    state
        .store
        .find_exam(&exam_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("exam", &exam_id))
}

pub async fn delete_exam(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.store.delete_exam(&exam_id).await? {
        return Err(AppError::not_found("exam", &exam_id));
    }
    tracing::info!("[server] exam {} deleted", exam_id);
    Ok(Json(serde_json::json!({ "status": "deleted", "id": exam_id })))
}

pub async fn exam_results(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
) -> ApiResult<Json<Vec<ExamSession>>> {
    if state.store.find_exam(&exam_id).await?.is_none() {
        return Err(AppError::not_found("exam", &exam_id));
    }
    Ok(Json(state.store.list_sessions_for_exam(&exam_id).await?))
}

// ---- sessions ----

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(exam_id): Path<String>,
    Json(req): Json<StartSessionRequest>,
) -> ApiResult<(StatusCode, Json<ExamSession>)> {
    let exam = state
        .store
        .find_exam(&exam_id)
        .await?
        .ok_or_else(|| AppError::not_found("exam", &exam_id))?;
    if !exam.is_active {
        return Err(AppError::Conflict(format!(
            "exam {exam_id} is not accepting sessions"
        )));
    }
    if state.store.find_user(&req.student_id).await?.is_none() {
        return Err(AppError::not_found("user", &req.student_id));
    }

    let session = ExamSession::start(exam.id, req.student_id);
    state.store.insert_session(&session).await?;
    tracing::info!(
        "[server] session {} started for student {}",
        session.id,
        session.student_id
    );
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ExamSession>> {
    state
        .store
        .load_session(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("session", &session_id))
}

pub async fn session_violations(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<ViolationRecord>>> {
    if state.store.load_session(&session_id).await?.is_none() {
        return Err(AppError::not_found("session", &session_id));
    }
    Ok(Json(state.store.load_violations(&session_id).await?))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if !state.store.delete_session(&session_id).await? {
        return Err(AppError::not_found("session", &session_id));
    }
    Ok(Json(serde_json::json!({ "status": "deleted", "id": session_id })))
}

/// Returns as soon as the session is marked `processing`; scoring runs detached.
pub async fn finish_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let ticket = state.finalizer.finish(&session_id).await?;
    record_audit(
        &state,
        AuditEntry::new(
            "session.finished",
            None,
            serde_json::json!({
                "session_id": ticket.session.id,
                "exam_id": ticket.session.exam_id,
                "student_id": ticket.session.student_id,
            }),
        ),
    )
    .await;
    Ok(Json(serde_json::json!({
        "status": "exam_finished",
        "message": "Results are being processed"
    })))
}

// ---- violation ingestion ----

pub async fn report_violation(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ViolationReport>,
) -> ApiResult<(StatusCode, Json<ViolationReceipt>)> {
    let tag = report.violation_type.trim();
    if tag.is_empty() {
        return Err(AppError::BadRequest("violation_type is required".into()));
    }
    if let Some(confidence) = report.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AppError::BadRequest(format!(
                "confidence {confidence} is outside [0, 1]"
            )));
        }
    }

    let kind = ViolationKind::from(tag);
    let severity = state.severity.severity_of(&kind);
    let record = ViolationRecord {
        id: Uuid::new_v4().to_string(),
        session_id: report.session_id,
        kind,
        timestamp: report.timestamp.unwrap_or_else(Utc::now),
        severity_score: Some(severity),
        confidence: report.confidence,
        evidence_url: report.evidence_url,
    };
    // the store checks `active` and appends as one step
    match state.store.append_violation(&record).await? {
        Admission::Recorded => {}
        Admission::Rejected(status) => {
            return Err(AppError::InvalidState {
                session_id: record.session_id,
                status,
            })
        }
        Admission::Missing => return Err(AppError::not_found("session", &record.session_id)),
    }
    tracing::info!(
        "[server] violation {} ({}) recorded for session {}",
        record.id,
        record.kind,
        record.session_id
    );

    Ok((
        StatusCode::CREATED,
        Json(ViolationReceipt {
            status: "received".to_string(),
            violation_id: record.id,
            severity_score: severity,
        }),
    ))
}

// ---- audit trail ----

pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    Ok(Json(state.store.list_audit(AUDIT_PAGE_SIZE).await?))
}
