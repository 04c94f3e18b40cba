pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::admin::handlers::{handle_login, handle_logout, handle_logs, handle_metrics};
use crate::analysis::extract_text::MAX_UPLOAD_BYTES;
use crate::analysis::handlers::handle_analyze;
use crate::state::AppState;

/// Room for a maximum-size upload plus multipart framing and form fields.
const ANALYZE_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/analyze",
            post(handle_analyze).layer(DefaultBodyLimit::max(ANALYZE_BODY_LIMIT)),
        )
        // Admin
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/logout", post(handle_logout))
        .route("/api/metrics", get(handle_metrics))
        .route("/api/logs", get(handle_logs))
        .with_state(state)
}
