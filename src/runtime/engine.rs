/// Graph executor
///
/// Runs one workflow: walks the compiled petgraph depth-first from each entry
/// node, executes every node with its kind-specific handler, stores results in
/// a per-run `VariableContext` and follows the outgoing edges that fire.
/// Within a run the walk is sequential; separate runs share nothing.

use crate::error::{NodeError, RunError};
use crate::runtime::condition;
use crate::runtime::context::VariableContext;
use crate::runtime::dispatcher::ActionDispatcher;
use crate::runtime::recorder::ExecutionRecorder;
use crate::runtime::transform::transform;
use crate::workflow::graph::CompiledWorkflow;
use crate::workflow::types::{
    Execution, ExecutionStatus, LogEntry, LogLevel, Node, NodeConfig, PluginActionConfig,
    RunOutcome, TriggerType,
};
use anyhow::Result;
use chrono::Utc;
use petgraph::graph::NodeIndex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub struct GraphExecutor {
    dispatcher: ActionDispatcher,
    recorder: Arc<dyn ExecutionRecorder>,
}

/// Per-run input shared by every handler
struct RunInput<'a> {
    trigger_type: TriggerType,
    payload: Option<&'a Value>,
}

enum Step {
    Enter(NodeIndex),
    Leave(NodeIndex),
}

impl GraphExecutor {
    pub fn new(dispatcher: ActionDispatcher, recorder: Arc<dyn ExecutionRecorder>) -> Self {
        Self { dispatcher, recorder }
    }

    /// Run a workflow and record it
    ///
    /// The execution is written once when it starts running and once when it
    /// reaches its terminal status. Only recorder failures surface as `Err`; a
    /// failed run is an `Ok` execution with status `failed`.
    pub async fn execute(
        &self,
        workflow: &CompiledWorkflow,
        trigger_type: TriggerType,
        payload: Option<Value>,
    ) -> Result<Execution> {
        let mut execution = Execution::pending(workflow.id(), trigger_type);
        execution.start()?;
        self.recorder.record_start(&execution).await?;

        let outcome = self.run(workflow, trigger_type, payload.as_ref()).await;
        execution.finish(outcome)?;
        self.recorder.record_finish(&execution).await?;

        tracing::info!(
            "🏁 Execution {} of workflow '{}' finished: {}",
            execution.id,
            execution.workflow_id,
            execution.status
        );
        Ok(execution)
    }

    /// Walk the graph without touching the recorder
    pub async fn run(
        &self,
        workflow: &CompiledWorkflow,
        trigger_type: TriggerType,
        payload: Option<&Value>,
    ) -> RunOutcome {
        let mut log = RunLog::new(workflow.id());
        let input = RunInput { trigger_type, payload };

        let (entries, fallback) = workflow.entry_nodes();
        if entries.is_empty() {
            return log.fail(RunError::NoTriggerNode);
        }

        log.info(format!(
            "Starting workflow execution: {} (trigger: {})",
            workflow.id(),
            trigger_type
        ));
        if fallback {
            log.warning(format!(
                "No trigger node found, starting from first node: {}",
                workflow.node(entries[0]).id
            ));
        }

        let mut ctx = VariableContext::new();
        let mut result = Value::Null;
        let mut first_error: Option<RunError> = None;

        for entry in entries {
            let mut stack = vec![Step::Enter(entry)];
            let mut on_path: HashSet<NodeIndex> = HashSet::new();

            while let Some(step) = stack.pop() {
                let index = match step {
                    Step::Leave(index) => {
                        on_path.remove(&index);
                        continue;
                    }
                    Step::Enter(index) => index,
                };

                let node = workflow.node(index);
                if !on_path.insert(index) {
                    return log.fail(RunError::CycleDetected(node.id.clone()));
                }
                stack.push(Step::Leave(index));

                log.info(format!("Executing node: {} (type: {})", node.id, node.kind()));

                match self.execute_node(node, &mut ctx, &input, &mut log).await {
                    Ok(node_result) => {
                        ctx.set(node.id.clone(), node_result.clone());
                        // reversed so the first declared edge is walked first
                        for (edge, target) in workflow.outgoing(index).into_iter().rev() {
                            if edge.fires_for(&node_result) {
                                stack.push(Step::Enter(target));
                            } else {
                                tracing::debug!("⏭️ Edge '{}' not taken", edge.id);
                            }
                        }
                        result = node_result;
                    }
                    Err(e) => {
                        log.error(format!("Error executing node {}: {}", node.id, e));
                        first_error.get_or_insert(RunError::Node {
                            node_id: node.id.clone(),
                            source: e,
                        });
                    }
                }
            }
        }

        match first_error {
            Some(error) => log.fail(error),
            None => log.complete(result),
        }
    }

    async fn execute_node(
        &self,
        node: &Node,
        ctx: &mut VariableContext,
        input: &RunInput<'_>,
        log: &mut RunLog,
    ) -> Result<Value, NodeError> {
        match &node.config {
            NodeConfig::Trigger(_) => {
                let mut result = json!({
                    "triggered": true,
                    "timestamp": Utc::now().to_rfc3339(),
                    "trigger_type": input.trigger_type,
                });
                if let Some(payload) = input.payload {
                    result["payload"] = payload.clone();
                }
                Ok(result)
            }
            NodeConfig::PluginAction(config) => self.execute_plugin_action(config, ctx, log).await,
            NodeConfig::Condition(config) => {
                let left = ctx.resolve(&config.left_value);
                let right = ctx.resolve(&config.right_value);
                let outcome = condition::evaluate(config.effective_operator(), &left, &right)?;
                Ok(Value::Bool(outcome))
            }
            NodeConfig::Delay(config) => {
                let duration = config.duration().ok_or(NodeError::InvalidDelay(config.delay))?;
                log.info(format!("Delaying execution for {} seconds", config.delay));
                tokio::time::sleep(duration).await;
                Ok(json!({ "delayed": config.delay }))
            }
            NodeConfig::Transform(config) => transform(config, ctx),
            NodeConfig::Unknown { kind } => {
                log.warning(format!("Unknown node type: {}", kind));
                Ok(Value::Null)
            }
        }
    }

    async fn execute_plugin_action(
        &self,
        config: &PluginActionConfig,
        ctx: &VariableContext,
        log: &mut RunLog,
    ) -> Result<Value, NodeError> {
        let params = match &config.prompt_template {
            Some(template) => {
                let content = ctx.resolve(&Value::String(template.clone()));
                json!({ "messages": [{ "role": "user", "content": content }] })
            }
            None => ctx.resolve(&config.parameters),
        };

        log.info(format!(
            "Calling plugin API: {} {}",
            config.method.to_uppercase(),
            self.dispatcher.action_url(&config.plugin, &config.action)
        ));

        let response = self
            .dispatcher
            .dispatch(&config.plugin, &config.action, &config.method, &params)
            .await?;

        log.info(format!("Plugin API response: {}", response.status));
        Ok(response.body)
    }
}

/// Execution log for one run, mirrored to tracing
struct RunLog {
    workflow_id: String,
    entries: Vec<LogEntry>,
}

impl RunLog {
    fn new(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            entries: Vec::new(),
        }
    }

    fn push(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => tracing::info!("[{}] {}", self.workflow_id, message),
            LogLevel::Warning => tracing::warn!("[{}] {}", self.workflow_id, message),
            LogLevel::Error => tracing::error!("[{}] {}", self.workflow_id, message),
        }
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            message,
            level,
        });
    }

    fn info(&mut self, message: String) {
        self.push(LogLevel::Info, message);
    }

    fn warning(&mut self, message: String) {
        self.push(LogLevel::Warning, message);
    }

    fn error(&mut self, message: String) {
        self.push(LogLevel::Error, message);
    }

    fn complete(self, result: Value) -> RunOutcome {
        RunOutcome {
            status: ExecutionStatus::Completed,
            logs: self.entries,
            result: Some(result),
            error: None,
        }
    }

    fn fail(mut self, error: RunError) -> RunOutcome {
        let message = match &error {
            RunError::NoTriggerNode => error.to_string(),
            other => format!("Workflow execution failed: {}", other),
        };
        self.error(message);
        RunOutcome {
            status: ExecutionStatus::Failed,
            logs: self.entries,
            result: None,
            error: Some(error),
        }
    }
}
