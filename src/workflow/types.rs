/// Core workflow type definitions
///
/// Workflows, nodes and edges are stored as JSON and validated when they are
/// deserialized: every node's `data` is parsed into a typed `NodeConfig` so the
/// executor never looks up stringly-typed fields at run time.
/// Executions carry their own lifecycle (pending -> running -> terminal).

use crate::error::{DefinitionError, ExecutionStateError, RunError};
use crate::runtime::condition::ConditionOperator;
use crate::runtime::expression::{truthy, Expression};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier; generated on create when empty
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Optional 5-field cron expression
    #[serde(default)]
    pub schedule: Option<String>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl Workflow {
    /// Cron expression, if one is set and non-blank
    pub fn cron_schedule(&self) -> Option<&str> {
        self.schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether the scheduler should hold a registration for this workflow
    pub fn wants_schedule(&self) -> bool {
        self.enabled && self.cron_schedule().is_some()
    }

    /// Structural checks shared by creation and compilation:
    /// unique node ids, unique edge ids, edges referencing known nodes.
    pub fn check_structure(&self) -> Result<(), DefinitionError> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(DefinitionError::DuplicateNodeId(node.id.clone()));
            }
        }

        let mut edge_ids = HashSet::new();
        for edge in &self.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(DefinitionError::DuplicateEdgeId(edge.id.clone()));
            }
            for (endpoint, node_id) in [("source", &edge.source), ("target", &edge.target)] {
                if !node_ids.contains(node_id.as_str()) {
                    return Err(DefinitionError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        endpoint,
                        node_id: node_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Full validation applied before a workflow is stored
    ///
    /// Adds the checks that only make sense for a user-submitted definition:
    /// a name, at least one node to start from, and a parseable schedule.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::MissingName);
        }
        if self.nodes.is_empty() {
            return Err(DefinitionError::NoTriggerNode);
        }
        self.check_structure()?;
        if let Some(expression) = self.cron_schedule() {
            crate::runtime::scheduler::parse_cron(expression)?;
        }
        Ok(())
    }
}

/// A single node in the workflow graph
///
/// Serialized in the editor's wire shape `{id, type, position, data}`. The
/// submitted `data` object is kept verbatim so UI-only fields round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "NodeDocument", into = "NodeDocument")]
pub struct Node {
    pub id: String,
    pub config: NodeConfig,
    pub position: Option<Value>,
    data: Value,
}

/// Wire representation of a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

impl TryFrom<NodeDocument> for Node {
    type Error = DefinitionError;

    fn try_from(doc: NodeDocument) -> Result<Self, Self::Error> {
        Node::new(doc.id, &doc.kind, doc.data).map(|node| Node {
            position: doc.position,
            ..node
        })
    }
}

impl From<Node> for NodeDocument {
    fn from(node: Node) -> Self {
        NodeDocument {
            kind: node.kind().to_string(),
            id: node.id,
            position: node.position,
            data: node.data,
        }
    }
}

impl Node {
    /// Build a node from its kind and raw config, validating the config
    pub fn new(id: impl Into<String>, kind: &str, data: Value) -> Result<Self, DefinitionError> {
        let id = id.into();
        let config = NodeConfig::parse(kind, &data).map_err(|reason| {
            DefinitionError::InvalidNodeConfig {
                node_id: id.clone(),
                kind: kind.to_string(),
                reason,
            }
        })?;
        Ok(Self {
            id,
            config,
            position: None,
            data,
        })
    }

    /// Node kind as it appears on the wire
    pub fn kind(&self) -> &str {
        self.config.kind()
    }

    /// Raw config object as submitted
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.config, NodeConfig::Trigger(_))
    }

    /// Trigger node configured to fire from `POST /webhook/{id}`
    pub fn is_webhook_trigger(&self) -> bool {
        matches!(
            &self.config,
            NodeConfig::Trigger(TriggerConfig { trigger_type: TriggerMode::Webhook })
        )
    }
}

/// Typed node configuration, one variant per node kind
#[derive(Debug, Clone)]
pub enum NodeConfig {
    Trigger(TriggerConfig),
    PluginAction(PluginActionConfig),
    Condition(ConditionConfig),
    Delay(DelayConfig),
    Transform(TransformConfig),
    /// Kinds this engine does not know; executed as a no-op with a warning
    Unknown { kind: String },
}

impl NodeConfig {
    /// Parse the `data` object of a node of the given kind
    pub fn parse(kind: &str, data: &Value) -> Result<Self, String> {
        let mut data = match data {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        let reason = |e: serde_json::Error| e.to_string();

        match kind {
            "trigger" => serde_json::from_value(data).map(NodeConfig::Trigger).map_err(reason),
            "plugin-action" => serde_json::from_value(data)
                .map(NodeConfig::PluginAction)
                .map_err(reason),
            "condition" => serde_json::from_value(data)
                .map(NodeConfig::Condition)
                .map_err(reason),
            "delay" => {
                let config: DelayConfig = serde_json::from_value(data).map_err(reason)?;
                if config.duration().is_none() {
                    return Err(format!(
                        "delay must be a non-negative number of seconds within range, got {}",
                        config.delay
                    ));
                }
                Ok(NodeConfig::Delay(config))
            }
            "transform" => {
                if let Value::Object(map) = &mut data {
                    map.entry("transformType").or_insert_with(|| json!("set"));
                }
                serde_json::from_value(data)
                    .map(NodeConfig::Transform)
                    .map_err(reason)
            }
            other => Ok(NodeConfig::Unknown {
                kind: other.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            NodeConfig::Trigger(_) => "trigger",
            NodeConfig::PluginAction(_) => "plugin-action",
            NodeConfig::Condition(_) => "condition",
            NodeConfig::Delay(_) => "delay",
            NodeConfig::Transform(_) => "transform",
            NodeConfig::Unknown { kind } => kind,
        }
    }
}

/// How a trigger node is meant to be fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Manual,
    Schedule,
    Webhook,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(default)]
    pub trigger_type: TriggerMode,
}

/// Call to `{base_url}/plugins/{plugin}{action}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginActionConfig {
    pub plugin: String,
    pub action: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    /// When present, replaces `parameters` with a single user message
    #[serde(default)]
    pub prompt_template: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    #[serde(default)]
    pub operator: Option<ConditionOperator>,
    /// Older editor field; any value other than `always` means "compare"
    #[serde(default)]
    pub condition_type: Option<String>,
    #[serde(default)]
    pub left_value: Value,
    #[serde(default)]
    pub right_value: Value,
}

impl ConditionConfig {
    /// Operator to apply: explicit `operator`, else `equals` for a
    /// non-`always` `conditionType`, else `always`
    pub fn effective_operator(&self) -> ConditionOperator {
        if let Some(operator) = self.operator {
            return operator;
        }
        match self.condition_type.as_deref() {
            Some(kind) if kind != "always" => ConditionOperator::Equals,
            _ => ConditionOperator::Always,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Seconds to suspend the current run
    #[serde(default = "default_delay")]
    pub delay: f64,
}

fn default_delay() -> f64 {
    1.0
}

impl DelayConfig {
    /// Sleep length; `None` for negative, non-finite or out-of-range values
    pub fn duration(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.delay).ok()
    }
}

/// Closed set of data-shaping operations
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transformType", rename_all = "lowercase")]
pub enum TransformConfig {
    /// Assign a resolved value to a named context variable
    Set {
        variable: String,
        #[serde(default)]
        value: Value,
    },
    /// Shallow-merge every source that resolves to an object
    Merge {
        #[serde(default)]
        sources: Vec<Value>,
    },
    /// Evaluate an expression, optionally storing it under `variable`
    Expression {
        expression: Expression,
        #[serde(default)]
        variable: Option<String>,
    },
}

/// Directed connection between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: Option<Value>,
}

impl Edge {
    /// An edge is gated only when it carries a non-empty condition
    pub fn is_gated(&self) -> bool {
        self.condition.as_ref().is_some_and(truthy)
    }

    /// Gated edges fire unless the source result is exactly `false`
    pub fn fires_for(&self, source_result: &Value) -> bool {
        if !self.is_gated() {
            return true;
        }
        !matches!(source_result, Value::Bool(false))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Manual,
    Schedule,
    Webhook,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Manual => "manual",
            TriggerType::Schedule => "schedule",
            TriggerType::Webhook => "webhook",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TriggerType::Manual),
            "schedule" => Ok(TriggerType::Schedule),
            "webhook" => Ok(TriggerType::Webhook),
            other => Err(format!("unknown trigger type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// One user-facing line of an execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
}

/// What a single run of the graph produced
#[derive(Debug)]
pub struct RunOutcome {
    pub status: ExecutionStatus,
    pub logs: Vec<LogEntry>,
    pub result: Option<Value>,
    pub error: Option<RunError>,
}

/// One concrete, timestamped run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Execution {
    /// A freshly created execution that has not started yet
    pub fn pending(workflow_id: impl Into<String>, trigger_type: TriggerType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Pending,
            trigger_type,
            start_time: None,
            end_time: None,
            logs: Vec::new(),
            result: None,
            error: None,
        }
    }

    pub fn start(&mut self) -> Result<(), ExecutionStateError> {
        self.transition(ExecutionStatus::Running)?;
        self.start_time = Some(Utc::now());
        Ok(())
    }

    /// Move to the outcome's terminal status; allowed exactly once
    pub fn finish(&mut self, outcome: RunOutcome) -> Result<(), ExecutionStateError> {
        self.transition(outcome.status)?;
        self.end_time = Some(Utc::now());
        self.logs = outcome.logs;
        self.result = outcome.result;
        self.error = outcome.error.map(|e| e.to_string());
        Ok(())
    }

    fn transition(&mut self, to: ExecutionStatus) -> Result<(), ExecutionStateError> {
        let allowed = match (self.status, to) {
            (ExecutionStatus::Pending, ExecutionStatus::Running) => true,
            (ExecutionStatus::Running, next) => next.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(ExecutionStateError {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workflow(value: Value) -> Workflow {
        serde_json::from_value(value).expect("valid workflow json")
    }

    #[test]
    fn test_node_round_trips_editor_shape() {
        let raw = json!({
            "id": "p1",
            "type": "plugin-action",
            "position": {"x": 10.0, "y": 20.0},
            "data": {"plugin": "echo", "action": "/ping", "label": "Ping"}
        });

        let node: Node = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(node.kind(), "plugin-action");
        match &node.config {
            NodeConfig::PluginAction(cfg) => {
                assert_eq!(cfg.method, "GET");
                assert_eq!(cfg.parameters, json!({}));
            }
            other => panic!("unexpected config: {:?}", other),
        }

        // UI-only fields survive
        assert_eq!(serde_json::to_value(&node).unwrap(), raw);
    }

    #[test]
    fn test_invalid_node_config_is_a_definition_error() {
        let err = serde_json::from_value::<Node>(json!({
            "id": "p1", "type": "plugin-action", "data": {"action": "/ping"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("p1"), "{}", err);

        let err = Node::new("d1", "delay", json!({"delay": -3})).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidNodeConfig { .. }));

        // larger than any Duration
        let err = Node::new("d2", "delay", json!({"delay": 1e20})).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidNodeConfig { .. }));
        let err = serde_json::from_value::<Workflow>(json!({
            "id": "wf", "name": "sleepy",
            "nodes": [
                {"id": "t1", "type": "trigger", "data": {}},
                {"id": "d2", "type": "delay", "data": {"delay": 1e20}}
            ],
            "edges": [{"id": "e1", "source": "t1", "target": "d2"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("d2"), "{}", err);

        assert!(Node::new("d3", "delay", json!({"delay": 0.25})).is_ok());

        let err = Node::new("x1", "transform", json!({"transformType": "exec", "code": "1"}))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidNodeConfig { .. }));
    }

    #[test]
    fn test_transform_defaults_to_set() {
        let node = Node::new("x1", "transform", json!({"variable": "v", "value": 1})).unwrap();
        assert!(matches!(
            node.config,
            NodeConfig::Transform(TransformConfig::Set { .. })
        ));
        // raw data is untouched by the default
        assert!(node.data().get("transformType").is_none());
    }

    #[test]
    fn test_condition_operator_defaults() {
        let operator = |data: Value| match Node::new("c", "condition", data).unwrap().config {
            NodeConfig::Condition(cfg) => cfg.effective_operator(),
            other => panic!("unexpected config: {:?}", other),
        };
        assert_eq!(operator(json!({})), ConditionOperator::Always);
        assert_eq!(operator(json!({"operator": "less_than"})), ConditionOperator::LessThan);
        assert_eq!(operator(json!({"conditionType": "comparison"})), ConditionOperator::Equals);
        assert_eq!(operator(json!({"conditionType": "always"})), ConditionOperator::Always);
    }

    #[test]
    fn test_unknown_kind_is_kept() {
        let node = Node::new("s1", "sticky-note", json!({"text": "hi"})).unwrap();
        assert_eq!(node.kind(), "sticky-note");
        assert!(matches!(node.config, NodeConfig::Unknown { .. }));
    }

    #[test]
    fn test_webhook_trigger_detection() {
        let hook = Node::new("h1", "trigger", json!({"triggerType": "webhook"})).unwrap();
        let manual = Node::new("t1", "trigger", Value::Null).unwrap();
        assert!(hook.is_webhook_trigger());
        assert!(manual.is_trigger());
        assert!(!manual.is_webhook_trigger());
    }

    #[test]
    fn test_edge_condition_gating() {
        let plain = Edge { id: "e1".into(), source: "a".into(), target: "b".into(), condition: None };
        let empty = Edge { condition: Some(json!({})), ..plain.clone() };
        let gated = Edge { condition: Some(json!({"type": "result"})), ..plain.clone() };

        assert!(plain.fires_for(&json!(false)));
        assert!(empty.fires_for(&json!(false)));
        assert!(!gated.fires_for(&json!(false)));
        assert!(gated.fires_for(&json!(true)));
        assert!(gated.fires_for(&json!({"ok": false})));
    }

    #[test]
    fn test_validate_rejects_bad_definitions() {
        let dangling = workflow(json!({
            "name": "wf",
            "nodes": [{"id": "t1", "type": "trigger", "data": {}}],
            "edges": [{"id": "e1", "source": "t1", "target": "nope"}]
        }));
        assert!(matches!(
            dangling.validate(),
            Err(DefinitionError::DanglingEdge { endpoint: "target", .. })
        ));

        let duplicate = workflow(json!({
            "name": "wf",
            "nodes": [
                {"id": "t1", "type": "trigger", "data": {}},
                {"id": "t1", "type": "delay", "data": {}}
            ],
            "edges": []
        }));
        assert!(matches!(duplicate.validate(), Err(DefinitionError::DuplicateNodeId(_))));

        let empty = workflow(json!({"name": "wf", "nodes": [], "edges": []}));
        assert!(matches!(empty.validate(), Err(DefinitionError::NoTriggerNode)));

        let bad_cron = workflow(json!({
            "name": "wf", "schedule": "every day",
            "nodes": [{"id": "t1", "type": "trigger", "data": {}}],
            "edges": []
        }));
        assert!(matches!(bad_cron.validate(), Err(DefinitionError::Schedule(_))));
    }

    #[test]
    fn test_execution_lifecycle_terminates_once() {
        let mut execution = Execution::pending("wf", TriggerType::Manual);
        assert_eq!(execution.status, ExecutionStatus::Pending);

        execution.start().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.start_time.is_some());

        let outcome = || RunOutcome {
            status: ExecutionStatus::Completed,
            logs: Vec::new(),
            result: Some(json!(1)),
            error: None,
        };
        execution.finish(outcome()).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.end_time.is_some());

        let err = execution.finish(outcome()).unwrap_err();
        assert_eq!(err.from, ExecutionStatus::Completed);
    }
}
