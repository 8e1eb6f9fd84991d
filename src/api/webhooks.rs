/// Webhook trigger endpoint
///
/// External events address a trigger node by id. Every enabled workflow that
/// has a webhook trigger with that id runs once, in workflow id order, with the
/// request body as the trigger payload.

use crate::api::{ApiError, AppState};
use crate::workflow::types::TriggerType;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Map, Value};

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook/{node_id}", post(trigger_webhook))
}

/// POST /webhook/{node_id}
///
/// Body: optional JSON payload (an empty body means `{}`)
async fn trigger_webhook(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    tracing::info!("📥 Webhook request received for node: {}", node_id);

    // Parse JSON body manually so an empty body is accepted
    let payload: Value = if body.trim().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("❌ Invalid JSON payload for webhook {}: {}", node_id, e);
            ApiError::bad_request(format!("Invalid JSON payload: {}", e))
        })?
    };

    let targets = state.registry.webhook_targets(&node_id);
    if targets.is_empty() {
        tracing::debug!("🔍 No enabled workflow listens on webhook node {}", node_id);
        return Ok(Json(json!({
            "status": "no_workflows",
            "message": format!("No enabled workflows found with webhook trigger node: {}", node_id),
        })));
    }

    let mut triggered = Vec::with_capacity(targets.len());
    for compiled in targets {
        tracing::info!("🚀 Webhook {} triggers workflow {}", node_id, compiled.id());
        let execution = state
            .executor
            .execute(&compiled, TriggerType::Webhook, Some(payload.clone()))
            .await
            .map_err(|e| ApiError::internal(format!("Failed to trigger webhook: {}", e)))?;

        triggered.push(json!({
            "workflow_id": compiled.id(),
            "workflow_name": compiled.workflow.name,
            "execution_id": execution.id,
        }));
    }

    Ok(Json(json!({
        "status": "triggered",
        "workflows": triggered,
        "payload": payload,
    })))
}
