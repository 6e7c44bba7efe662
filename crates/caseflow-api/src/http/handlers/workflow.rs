//! Workflow catalog and start handlers.

use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::Deserialize;

use caseflow_types::workflow::{JsonMap, WorkflowDefinition, WorkflowResponse};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Body of `POST /workflows/{id}/start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub inputs: JsonMap,
    #[serde(default)]
    pub context: JsonMap,
}

/// Mounted at `/api/v1` by the main router.
pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows))
        .route("/workflows/search", get(search_workflows))
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/start", post(start_workflow))
}

/// GET /api/v1/workflows
pub async fn list_workflows(State(state): State<AppState>) -> ApiResponse<Vec<WorkflowDefinition>> {
    let start = Instant::now();
    let defs = state.engine.list_workflows().into_iter().cloned().collect();
    ApiResponse::success(defs, start).with_link("self", "/api/v1/workflows")
}

/// GET /api/v1/workflows/search?q=
pub async fn search_workflows(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<ApiResponse<Vec<WorkflowDefinition>>, AppError> {
    let start = Instant::now();
    if query.q.trim().is_empty() {
        return Err(AppError::Validation("query parameter 'q' must not be empty".to_string()));
    }
    let defs = state.engine.find_by_keyword(&query.q).into_iter().cloned().collect();
    Ok(ApiResponse::success(defs, start))
}

/// GET /api/v1/workflows/{id}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<WorkflowDefinition>, AppError> {
    let start = Instant::now();
    let def = state
        .engine
        .registry()
        .get(&id)
        .cloned()
        .ok_or_else(|| AppError::WorkflowNotFound(id.clone()))?;
    Ok(ApiResponse::success(def, start)
        .with_link("self", format!("/api/v1/workflows/{id}"))
        .with_link("start", format!("/api/v1/workflows/{id}/start")))
}

/// POST /api/v1/workflows/{id}/start
///
/// Always 200: an unknown workflow or missing inputs are reported in the
/// workflow response itself.
pub async fn start_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StartRequest>,
) -> ApiResponse<WorkflowResponse> {
    let start = Instant::now();
    let response = state.engine.start(&id, body.inputs, body.context).await;
    tracing::info!(workflow_id = %id, status = %response.status, "workflow start handled");
    execution_links(ApiResponse::success(response, start))
}

/// Attach the execution's links when a record exists.
pub(crate) fn execution_links(resp: ApiResponse<WorkflowResponse>) -> ApiResponse<WorkflowResponse> {
    let Some(id) = resp.data.as_ref().and_then(|r| r.execution_id.clone()) else {
        return resp;
    };
    resp.with_link("execution", format!("/api/v1/executions/{id}"))
        .with_link("respond", format!("/api/v1/executions/{id}/respond"))
}
