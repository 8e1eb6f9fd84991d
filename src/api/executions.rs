/// Execution history and schedule introspection

use crate::api::{ApiError, AppState};
use crate::runtime::scheduler::ScheduledWorkflow;
use crate::workflow::types::Execution;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::collections::HashMap;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ExecutionQuery {
    pub workflow_id: Option<String>,
    pub limit: Option<i64>,
}

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/executions", get(list_executions))
        .route("/executions/{id}", get(get_execution))
        .route("/scheduled", get(list_scheduled))
}

/// GET /executions?workflow_id=&limit=
///
/// Newest first.
async fn list_executions(
    State(state): State<AppState>,
    Query(query): Query<ExecutionQuery>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).max(0);
    let workflow_id = query.workflow_id.as_deref().filter(|id| !id.is_empty());
    Ok(Json(state.storage.list_executions(workflow_id, limit).await?))
}

/// GET /executions/{id}
async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    state
        .storage
        .get_execution(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Execution not found"))
}

/// GET /scheduled
async fn list_scheduled(State(state): State<AppState>) -> Json<HashMap<String, ScheduledWorkflow>> {
    Json(state.scheduler.scheduled_workflows().await)
}
