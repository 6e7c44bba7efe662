//! Liveness probe.

use std::time::Instant;

use axum::extract::State;
use serde_json::json;

use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> ApiResponse<serde_json::Value> {
    let start = Instant::now();
    ApiResponse::success(
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "workflows": state.engine.registry().len(),
        }),
        start,
    )
}
