/// Runtime Execution Engine
///
/// Everything that happens while a workflow runs:
/// - Variable resolution between nodes
/// - Condition, transform and expression evaluation
/// - Outbound plugin calls
/// - The graph walk itself and its recording
/// - Cron scheduling of future runs

// Per-run variable store and placeholder resolution
pub mod context;

// Condition node comparisons
pub mod condition;

// Closed expression language used by transform nodes
pub mod expression;

// set / merge / expression transforms
pub mod transform;

// HTTP calls to plugin actions
pub mod dispatcher;

// Execution persistence seam
pub mod recorder;

// Depth-first graph executor
pub mod engine;

// Cron scheduler for workflows
pub mod scheduler;

pub use context::VariableContext;
pub use dispatcher::ActionDispatcher;
pub use engine::GraphExecutor;
pub use recorder::{ExecutionRecorder, MemoryRecorder};
pub use scheduler::WorkflowScheduler;
