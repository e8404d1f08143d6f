//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use sheetsync_core::messages::ApiResponse;

use super::AppState;
use crate::network::HealthState;

/// Detailed health information in the response envelope.
///
/// Always returns 200; `data.state` says whether the server is actually
/// serving, so monitoring can tell "up but draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let health = state.shutdown.health_state();
    Json(ApiResponse::ok(
        "server is healthy",
        json!({
            "state": health.as_str(),
            "in_flight": state.shutdown.in_flight_count(),
            "uptime_secs": state.start_time.elapsed().as_secs(),
            "users": state.users.len(),
        }),
    ))
}

/// Liveness probe: 200 while the process responds.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when ready, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
