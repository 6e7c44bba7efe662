//! Execution inspection, HITL responses and cancellation.

use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use caseflow_types::error::StoreError;
use caseflow_types::workflow::{JsonMap, UserDecision, WorkflowExecutionState, WorkflowResponse};

use crate::http::error::AppError;
use crate::http::handlers::workflow::execution_links;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Body of `POST /executions/{id}/respond`.
#[derive(Debug, Default, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub inputs: Option<JsonMap>,
    #[serde(default)]
    pub context: JsonMap,
}

#[derive(Debug, Serialize)]
pub struct CancelResult {
    pub execution_id: String,
    /// False when the execution had already finished.
    pub cancelled: bool,
}

/// Mounted at `/api/v1` by the main router.
pub fn execution_routes() -> Router<AppState> {
    Router::new()
        .route("/executions", get(list_executions))
        .route("/executions/{id}", get(get_execution))
        .route("/executions/{id}/respond", post(respond_execution))
        .route("/executions/{id}/cancel", post(cancel_execution))
}

/// GET /api/v1/executions
pub async fn list_executions(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<WorkflowExecutionState>>, AppError> {
    let start = Instant::now();
    let executions = state.engine.list_executions().await?;
    Ok(ApiResponse::success(executions, start).with_link("self", "/api/v1/executions"))
}

/// GET /api/v1/executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<WorkflowExecutionState>, AppError> {
    let start = Instant::now();
    let execution = state
        .engine
        .get_execution(&id)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    Ok(ApiResponse::success(execution, start).with_link("self", format!("/api/v1/executions/{id}")))
}

/// POST /api/v1/executions/{id}/respond
///
/// An unknown execution comes back as a `failed` workflow response, not 404.
pub async fn respond_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RespondRequest>,
) -> ApiResponse<WorkflowResponse> {
    let start = Instant::now();
    let decision = UserDecision {
        approved: body.approved,
        inputs: body.inputs,
    };
    let response = state.engine.respond(&id, decision, body.context).await;
    tracing::info!(execution_id = %id, status = %response.status, "workflow response handled");
    execution_links(ApiResponse::success(response, start))
}

/// POST /api/v1/executions/{id}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<CancelResult>, AppError> {
    let start = Instant::now();
    if state.engine.get_execution(&id).await?.is_none() {
        return Err(StoreError::NotFound(id).into());
    }
    let cancelled = state.engine.cancel(&id).await;
    Ok(ApiResponse::success(
        CancelResult {
            execution_id: id.clone(),
            cancelled,
        },
        start,
    )
    .with_link("execution", format!("/api/v1/executions/{id}")))
}
