use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "atsbuddy-api",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.openai_model,
        "serviceTier": state.config.service_tier.as_str(),
    }))
}
