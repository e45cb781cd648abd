use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::state::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state
        .load_balancer
        .all_backends()
        .iter()
        .filter(|b| b.is_healthy())
        .count();

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "healthy_backends": healthy,
        "tracked_quota_keys": state.guard.tracked_keys(),
    }))
}
