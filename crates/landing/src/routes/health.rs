//! Health check handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::state::AppState;

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness check.
///
/// Ready once a mailing list is configured; without one every lead endpoint
/// would answer 500.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.upsert().is_configured() {
        (StatusCode::OK, "ok")
    } else {
        tracing::warn!("Readiness check failed: mailing list not configured");
        (StatusCode::SERVICE_UNAVAILABLE, "mailing list not configured")
    }
}
