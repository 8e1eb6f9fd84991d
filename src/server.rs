/// Server setup and initialization
///
/// Wires together storage, registry, dispatcher, executor and scheduler, and
/// assembles the HTTP router on top of them.

use crate::{
    api::{
        create_catalog_routes, create_execution_routes, create_webhook_routes,
        create_workflow_routes, AppState,
    },
    config::Config,
    runtime::{ActionDispatcher, ExecutionRecorder, GraphExecutor, WorkflowScheduler},
    workflow::{WorkflowRegistry, WorkflowStorage},
};
use anyhow::{Context, Result};
use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the shared application state from configuration
///
/// Opens the SQLite database named in the config and hands it to
/// [`create_state_with_storage`].
pub async fn create_state(config: &Config) -> Result<AppState> {
    tracing::info!("📋 Opening workflow database: {}", config.database.path);
    let storage = WorkflowStorage::connect(&config.database.path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    create_state_with_storage(config, storage).await
}

/// Build the application state on an already opened storage
///
/// Runs the stale-execution sweep, loads the registry, registers cron jobs for
/// every enabled scheduled workflow and starts the scheduler when enabled.
pub async fn create_state_with_storage(config: &Config, storage: WorkflowStorage) -> Result<AppState> {
    storage
        .mark_stale_executions()
        .await
        .context("Failed to sweep interrupted executions")?;

    tracing::info!("📊 Initializing workflow registry");
    let registry = Arc::new(WorkflowRegistry::new(storage.clone()));
    registry
        .init_from_storage()
        .await
        .context("Failed to load workflows from storage")?;

    tracing::info!("🔌 Plugin actions dispatched to {}", config.dispatch.base_url);
    let dispatcher = ActionDispatcher::new(&config.dispatch)?;
    let recorder: Arc<dyn ExecutionRecorder> = Arc::new(storage.clone());
    let executor = Arc::new(GraphExecutor::new(dispatcher, recorder));

    tracing::info!("⏰ Initializing workflow scheduler");
    let scheduler = Arc::new(
        WorkflowScheduler::new()
            .await
            .context("Failed to initialize scheduler")?,
    );

    let state = AppState {
        storage,
        registry,
        scheduler,
        executor,
    };

    if config.scheduler.enabled {
        let registered = state
            .register_schedules()
            .await
            .context("Failed to register schedules")?;
        tracing::info!("📅 Registered {} scheduled workflows", registered);
        state.scheduler.start().await.context("Failed to start scheduler")?;
    } else {
        tracing::info!("⏸️ Scheduler disabled by configuration");
    }

    Ok(state)
}

/// Assemble every route over the given state
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_execution_routes())
        .merge(create_webhook_routes())
        .merge(create_catalog_routes())
        .with_state(state)
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    let state = create_state(&config).await?;
    tracing::info!("✅ Application initialized successfully");
    Ok(router(state))
}

/// Start the HTTP server with the given configuration
///
/// Runs until Ctrl-C, then stops the scheduler.
pub async fn start_server(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hubflow=info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting hubflow server...");

    let state = create_state(&config).await?;
    let scheduler = Arc::clone(&state.scheduler);
    let app = router(state);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await?;
    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
    }
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "scheduler_running": state.scheduler.is_running(),
        "scheduled_workflows": state.scheduler.scheduled_workflows().await.len(),
        "database_available": state.storage.ping().await,
    }))
}
