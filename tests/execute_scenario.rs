//! End-to-end runs through the public crate API, recorded in SQLite

mod common;

use common::{echo_workflow, spawn_plugin_server};
use hubflow::config::DispatchConfig;
use hubflow::runtime::ExecutionRecorder;
use hubflow::workflow::WorkflowStorage;
use hubflow::{ActionDispatcher, CompiledWorkflow, ExecutionStatus, GraphExecutor, TriggerType, Workflow};
use serde_json::json;
use std::sync::Arc;

async fn setup(base_url: &str) -> (GraphExecutor, WorkflowStorage) {
    let storage = WorkflowStorage::in_memory().await.unwrap();
    let dispatcher = ActionDispatcher::new(&DispatchConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
    })
    .unwrap();
    let recorder: Arc<dyn ExecutionRecorder> = Arc::new(storage.clone());
    (GraphExecutor::new(dispatcher, recorder), storage)
}

async fn store(storage: &WorkflowStorage, value: serde_json::Value) -> CompiledWorkflow {
    let mut workflow: Workflow = serde_json::from_value(value).unwrap();
    workflow.validate().unwrap();
    storage.save_workflow(&mut workflow).await.unwrap();
    CompiledWorkflow::compile(workflow).unwrap()
}

#[tokio::test]
async fn test_echo_ping_is_recorded() {
    let base = spawn_plugin_server().await;
    let (executor, storage) = setup(&base).await;
    let workflow = store(&storage, echo_workflow("wf-echo")).await;

    let execution = executor.execute(&workflow, TriggerType::Manual, None).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);

    let stored = storage.get_execution(&execution.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
    assert_eq!(stored.result, Some(json!({"pong": true, "count": 5, "query": {}})));
    assert!(stored.end_time.is_some());
    assert_eq!(stored.logs.len(), execution.logs.len());
    assert!(stored.logs[0].message.starts_with("Starting workflow execution: wf-echo"));
}

#[tokio::test]
async fn test_variables_flow_into_later_nodes() {
    let base = spawn_plugin_server().await;
    let (executor, storage) = setup(&base).await;
    let workflow = store(
        &storage,
        json!({
            "id": "wf-vars", "name": "variables",
            "nodes": [
                {"id": "t1", "type": "trigger", "data": {}},
                {"id": "p1", "type": "plugin-action", "data": {"plugin": "echo", "action": "/ping"}},
                {"id": "x1", "type": "transform",
                 "data": {"transformType": "expression", "expression": "p1.count * 2 + 1", "variable": "score"}},
                {"id": "c1", "type": "condition",
                 "data": {"operator": "greater_than", "leftValue": "{{score}}", "rightValue": 10}},
                {"id": "p2", "type": "plugin-action",
                 "data": {"plugin": "echo", "action": "/echo", "method": "POST",
                          "parameters": {"score": "{{score}}", "pong": "{{p1.pong}}"}}}
            ],
            "edges": [
                {"id": "e1", "source": "t1", "target": "p1"},
                {"id": "e2", "source": "p1", "target": "x1"},
                {"id": "e3", "source": "x1", "target": "c1"},
                {"id": "e4", "source": "c1", "target": "p2", "condition": {"when": "true"}}
            ]
        }),
    )
    .await;

    let execution = executor.execute(&workflow, TriggerType::Manual, None).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.result, Some(json!({"echo": {"score": 11, "pong": true}})));
}

#[tokio::test]
async fn test_failed_dispatch_is_recorded_as_failed() {
    // nothing listens on the discard port
    let (executor, storage) = setup("http://127.0.0.1:9").await;
    let workflow = store(&storage, echo_workflow("wf-down")).await;

    let execution = executor.execute(&workflow, TriggerType::Manual, None).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.result, None);

    let stored = storage.get_execution(&execution.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert!(stored.error.unwrap().contains("p1"));
}

#[tokio::test]
async fn test_interrupted_runs_are_swept() {
    let (_, storage) = setup("http://127.0.0.1:9").await;
    let workflow = store(&storage, echo_workflow("wf-crash")).await;

    let mut execution = hubflow::Execution::pending(workflow.id(), TriggerType::Schedule);
    execution.start().unwrap();
    storage.record_start(&execution).await.unwrap();

    assert_eq!(storage.mark_stale_executions().await.unwrap(), 1);
    let stored = storage.get_execution(&execution.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExecutionStatus::Failed);
    assert_eq!(
        stored.error.as_deref(),
        Some(hubflow::workflow::storage::INTERRUPTED_ERROR)
    );
}
