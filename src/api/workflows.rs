/// Workflow management REST API endpoints
///
/// Every write goes to storage first, then the compiled copy is swapped into
/// the registry and the cron registration is brought in line with the new
/// definition.

use crate::api::{ApiError, AppState};
use crate::workflow::types::{Execution, TriggerType, Workflow};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

/// Query string of the toggle endpoint
#[derive(Debug, Deserialize)]
pub struct ToggleQuery {
    pub enabled: bool,
}

/// Create workflow management routes
pub fn create_workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/workflows/{id}",
            get(get_workflow).put(update_workflow).delete(delete_workflow),
        )
        .route("/workflows/{id}/execute", post(execute_workflow))
        .route("/workflows/{id}/toggle", post(toggle_workflow))
}

/// Parse a request body into a workflow, reporting bad node data as 400
fn parse_workflow(body: Value) -> Result<Workflow, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::bad_request(format!("Invalid workflow: {}", e)))
}

/// GET /workflows
async fn list_workflows(State(state): State<AppState>) -> Result<Json<Vec<Workflow>>, ApiError> {
    Ok(Json(state.storage.list_workflows().await?))
}

/// GET /workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    state
        .storage
        .get_workflow(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Workflow not found"))
}

/// POST /workflows
///
/// A missing or empty `id` gets a fresh UUID.
async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Workflow>, ApiError> {
    let mut workflow = parse_workflow(body)?;
    if workflow.id.trim().is_empty() {
        workflow.id = uuid::Uuid::new_v4().to_string();
    }

    if state.storage.get_workflow(&workflow.id).await?.is_some() {
        return Err(ApiError::conflict(format!("Workflow already exists: {}", workflow.id)));
    }

    workflow.validate()?;
    workflow.created_at = None;
    state.storage.save_workflow(&mut workflow).await?;
    state.registry.insert(workflow.clone())?;
    state.sync_schedule(&workflow).await?;

    tracing::info!("🔥 Created workflow: {} ({})", workflow.id, workflow.name);
    Ok(Json(workflow))
}

/// PUT /workflows/{id}
///
/// Full replacement; the id comes from the path and `created_at` is kept.
async fn update_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Workflow>, ApiError> {
    let mut workflow = parse_workflow(body)?;
    workflow.id = id;

    let existing = state
        .storage
        .get_workflow(&workflow.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Workflow not found"))?;

    workflow.validate()?;
    workflow.created_at = existing.created_at;
    state.storage.save_workflow(&mut workflow).await?;
    state.registry.insert(workflow.clone())?;
    state.sync_schedule(&workflow).await?;

    tracing::info!("🔥 Hot-reloaded workflow: {} ({})", workflow.id, workflow.name);
    Ok(Json(workflow))
}

/// DELETE /workflows/{id}
///
/// The schedule is dropped only once the row is gone, so a failed delete
/// leaves the workflow running as before. Executions are removed with it.
async fn delete_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.storage.delete_workflow(&id).await? {
        return Err(ApiError::not_found("Workflow not found"));
    }
    // registry first: a job firing in between finds nothing to run
    state.registry.remove_workflow(&id);
    state.scheduler.unschedule(&id).await;

    tracing::info!("🗑️ Deleted workflow: {}", id);
    Ok(Json(json!({ "status": "deleted", "workflow_id": id })))
}

/// POST /workflows/{id}/execute
///
/// Runs to completion and returns the terminal execution. Disabled
/// workflows can still be run by hand.
async fn execute_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Execution>, ApiError> {
    let compiled = state
        .registry
        .get_workflow(&id)
        .ok_or_else(|| ApiError::not_found("Workflow not found"))?;

    let execution = state
        .executor
        .execute(&compiled, TriggerType::Manual, None)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to execute workflow: {}", e)))?;
    Ok(Json(execution))
}

/// POST /workflows/{id}/toggle?enabled=true|false
async fn toggle_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ToggleQuery>,
) -> Result<Json<Workflow>, ApiError> {
    let mut workflow = state
        .storage
        .get_workflow(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Workflow not found"))?;

    workflow.enabled = query.enabled;
    state.storage.save_workflow(&mut workflow).await?;
    state.registry.insert(workflow.clone())?;
    state.sync_schedule(&workflow).await?;

    tracing::info!(
        "{} workflow: {}",
        if workflow.enabled { "▶️ Enabled" } else { "⏸️ Disabled" },
        workflow.id
    );
    Ok(Json(workflow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::server::create_state_with_storage;
    use crate::workflow::WorkflowStorage;
    use axum::http::StatusCode;

    async fn state() -> AppState {
        let mut config = Config::default();
        config.dispatch.base_url = "http://127.0.0.1:9".to_string();
        config.scheduler.enabled = false;
        let storage = WorkflowStorage::in_memory().await.unwrap();
        create_state_with_storage(&config, storage).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_delete_keeps_schedule() {
        let state = state().await;
        create_workflow(
            State(state.clone()),
            Json(json!({
                "id": "wf", "name": "nightly", "schedule": "0 2 * * *",
                "nodes": [{"id": "t1", "type": "trigger", "data": {}}],
                "edges": []
            })),
        )
        .await
        .unwrap();
        assert!(state.scheduler.is_scheduled("wf").await);

        state.storage.close().await;
        let err = delete_workflow(State(state.clone()), Path("wf".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.scheduler.is_scheduled("wf").await);
        assert!(state.registry.get_workflow("wf").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_drops_schedule_and_registry_entry() {
        let state = state().await;
        create_workflow(
            State(state.clone()),
            Json(json!({
                "id": "wf", "name": "nightly", "schedule": "0 2 * * *",
                "nodes": [{"id": "t1", "type": "trigger", "data": {}}],
                "edges": []
            })),
        )
        .await
        .unwrap();

        let Json(body) = delete_workflow(State(state.clone()), Path("wf".to_string()))
            .await
            .unwrap();
        assert_eq!(body["status"], "deleted");
        assert!(!state.scheduler.is_scheduled("wf").await);
        assert!(state.registry.get_workflow("wf").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_schedules_reads_enabled_workflows_from_storage() {
        let state = state().await;
        for (id, enabled) in [("on", true), ("off", false), ("uncompiled", true)] {
            let mut workflow: Workflow = serde_json::from_value(json!({
                "id": id, "name": id, "enabled": enabled, "schedule": "0 2 * * *",
                "nodes": [{"id": "t1", "type": "trigger", "data": {}}],
                "edges": []
            }))
            .unwrap();
            state.storage.save_workflow(&mut workflow).await.unwrap();
            if id != "uncompiled" {
                state.registry.insert(workflow).unwrap();
            }
        }

        assert_eq!(state.register_schedules().await.unwrap(), 1);
        assert!(state.scheduler.is_scheduled("on").await);
        assert!(!state.scheduler.is_scheduled("off").await);
        assert!(!state.scheduler.is_scheduled("uncompiled").await);
    }
}
