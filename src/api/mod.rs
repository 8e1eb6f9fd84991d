/// HTTP API Layer
///
/// REST endpoints exposed to the dashboard:
/// - Workflow CRUD, manual execution and enable/disable
/// - Execution history and the current schedule
/// - Webhook triggers addressed by trigger node id
/// - Static plugin palette and command entries for the UI

use crate::error::{DefinitionError, ScheduleError};
use crate::runtime::scheduler::ScheduledCallback;
use crate::runtime::{GraphExecutor, WorkflowScheduler};
use crate::workflow::types::{TriggerType, Workflow};
use crate::workflow::{WorkflowRegistry, WorkflowStorage};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

// Workflow management endpoints (POST/GET/PUT/DELETE, execute, toggle)
pub mod workflows;

// Execution history and schedule introspection
pub mod executions;

// Webhook trigger endpoint
pub mod webhooks;

// Plugin palette and command entries
pub mod catalog;

pub use catalog::create_catalog_routes;
pub use executions::create_execution_routes;
pub use webhooks::create_webhook_routes;
pub use workflows::create_workflow_routes;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    /// Workflow and execution persistence
    pub storage: WorkflowStorage,
    /// Hot-reload registry of compiled workflows
    pub registry: Arc<WorkflowRegistry>,
    /// Cron registrations
    pub scheduler: Arc<WorkflowScheduler>,
    pub executor: Arc<GraphExecutor>,
}

impl AppState {
    /// Callback handed to the scheduler for every registration
    ///
    /// Each firing re-reads the registry, so a workflow deleted or disabled
    /// after registration is skipped instead of run.
    pub fn scheduled_callback(&self) -> ScheduledCallback {
        let registry = Arc::clone(&self.registry);
        let executor = Arc::clone(&self.executor);
        Arc::new(move |workflow_id: String| {
            let registry = Arc::clone(&registry);
            let executor = Arc::clone(&executor);
            Box::pin(async move {
                let Some(compiled) = registry.get_workflow(&workflow_id) else {
                    tracing::warn!("⚠️ Scheduled workflow {} no longer exists, skipping", workflow_id);
                    return;
                };
                if !compiled.workflow.enabled {
                    tracing::info!("⏸️ Scheduled workflow {} is disabled, skipping", workflow_id);
                    return;
                }
                if let Err(e) = executor.execute(&compiled, TriggerType::Schedule, None).await {
                    tracing::error!("❌ Scheduled execution of {} could not be recorded: {}", workflow_id, e);
                }
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }

    /// Register or drop the cron job so it matches the stored definition
    pub async fn sync_schedule(&self, workflow: &Workflow) -> Result<(), ScheduleError> {
        match workflow.cron_schedule() {
            Some(expression) if workflow.enabled => {
                self.scheduler
                    .schedule(&workflow.id, expression, self.scheduled_callback())
                    .await
            }
            _ => {
                self.scheduler.unschedule(&workflow.id).await;
                Ok(())
            }
        }
    }

    /// Register every enabled, scheduled workflow found in storage
    ///
    /// Definitions that did not compile into the registry are skipped.
    /// Returns how many were registered; failures are logged per workflow.
    pub async fn register_schedules(&self) -> anyhow::Result<usize> {
        let mut registered = 0;
        for workflow in self.storage.list_enabled_workflows().await? {
            if !workflow.wants_schedule() {
                continue;
            }
            if self.registry.get_workflow(&workflow.id).is_none() {
                tracing::warn!("⚠️ Workflow {} is not in the registry, not scheduling", workflow.id);
                continue;
            }
            match self.sync_schedule(&workflow).await {
                Ok(()) => registered += 1,
                Err(e) => tracing::error!("❌ Failed to schedule workflow {}: {}", workflow.id, e),
            }
        }
        Ok(registered)
    }
}

/// Handler error carrying its HTTP status
///
/// Serialised as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DefinitionError> for ApiError {
    fn from(err: DefinitionError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidCron { .. } => Self::bad_request(err.to_string()),
            ScheduleError::Scheduler(_) => {
                tracing::error!("❌ Scheduler error: {}", err);
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(definition) = err.downcast_ref::<DefinitionError>() {
            return Self::bad_request(definition.to_string());
        }
        tracing::error!("❌ Request failed: {:#}", err);
        Self::internal(err.to_string())
    }
}
