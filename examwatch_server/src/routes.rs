use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route("/users/:id", delete(handlers::delete_user))
        .route("/users/:id/toggle", patch(handlers::toggle_user))
        .route("/exams", get(handlers::list_exams).post(handlers::create_exam))
        .route(
            "/exams/:id",
            get(handlers::get_exam).delete(handlers::delete_exam),
        )
        .route("/exams/:id/sessions", post(handlers::start_session))
        .route("/exams/:id/results", get(handlers::exam_results))
        .route(
            "/exams/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/exams/sessions/:id/violations",
            get(handlers::session_violations),
        )
        .route("/exams/sessions/:id/finish", post(handlers::finish_session))
        .route(
            "/proctoring/report-violation",
            post(handlers::report_violation),
        )
        .route("/logs", get(handlers::list_audit_logs));

    Router::new()
        .route("/health", get(handlers::health_checker))
        .nest("/api/v1", api)
        // allow the browser client to talk to the server (CORS)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
