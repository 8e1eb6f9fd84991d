/// Error taxonomy for the workflow engine
///
/// Definition errors are raised when a workflow is created or registered and
/// never reach the executor. Node errors abort a single branch of a run.
/// Run errors are the terminal error attached to a failed execution.

use crate::workflow::types::ExecutionStatus;
use thiserror::Error;

/// A workflow definition that cannot be accepted
#[derive(Debug, Clone, Error)]
pub enum DefinitionError {
    #[error("workflow name must not be empty")]
    MissingName,

    #[error("workflow has no trigger node (node list is empty)")]
    NoTriggerNode,

    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("duplicate edge id: {0}")]
    DuplicateEdgeId(String),

    #[error("edge '{edge_id}' references unknown {endpoint} node '{node_id}'")]
    DanglingEdge {
        edge_id: String,
        endpoint: &'static str,
        node_id: String,
    },

    #[error("node '{node_id}' has invalid {kind} config: {reason}")]
    InvalidNodeConfig {
        node_id: String,
        kind: String,
        reason: String,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Cron registration failures, surfaced synchronously to the caller of `schedule`
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Parse and evaluation errors of the transform expression language
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("invalid expression at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("expression is nested too deeply")]
    TooDeep,

    #[error("expression is longer than {0} characters")]
    TooLong(usize),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,
}

/// Failure of an outbound plugin call
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("plugin API {url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Handler error raised while executing a single node
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("{operand} operand is not numeric: {value}")]
    NotNumeric { operand: &'static str, value: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("delay of {0} seconds is out of range")]
    InvalidDelay(f64),
}

/// Terminal error of a failed run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("No trigger node found")]
    NoTriggerNode,

    #[error("cycle detected at node '{0}'")]
    CycleDetected(String),

    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },
}

/// Illegal execution lifecycle transition
#[derive(Debug, Clone, Error)]
#[error("execution {id} cannot move from {from} to {to}")]
pub struct ExecutionStateError {
    pub id: String,
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}
