//! Shared fixtures for integration tests

#![allow(dead_code)]

use axum::{
    extract::{Json, Query},
    routing::{get, post},
    Router,
};
use hubflow::api::AppState;
use hubflow::config::Config;
use hubflow::server::create_state_with_storage;
use hubflow::workflow::WorkflowStorage;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Serve a stand-in `echo` plugin on an ephemeral port and return its base URL
pub async fn spawn_plugin_server() -> String {
    let app = Router::new()
        .route(
            "/plugins/echo/ping",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                Json(json!({"pong": true, "count": 5, "query": query}))
            }),
        )
        .route(
            "/plugins/echo/echo",
            post(|Json(body): Json<Value>| async move { Json(json!({"echo": body})) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}

/// Application state over an in-memory database, scheduler not started
pub async fn test_state(plugin_base_url: &str) -> AppState {
    let mut config = Config::default();
    config.dispatch.base_url = plugin_base_url.to_string();
    config.dispatch.timeout_secs = 5;
    config.scheduler.enabled = false;

    let storage = WorkflowStorage::in_memory().await.unwrap();
    create_state_with_storage(&config, storage).await.unwrap()
}

/// Trigger followed by a GET to the echo plugin
pub fn echo_workflow(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Echo ping",
        "nodes": [
            {"id": "t1", "type": "trigger", "position": {"x": 0, "y": 0}, "data": {"triggerType": "manual"}},
            {"id": "p1", "type": "plugin-action", "data": {"plugin": "echo", "action": "/ping", "method": "GET"}}
        ],
        "edges": [{"id": "e1", "source": "t1", "target": "p1"}]
    })
}
