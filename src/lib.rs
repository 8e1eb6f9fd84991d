/// hubflow: workflow engine for the productivity dashboard
///
/// Runs node/edge workflows (trigger, plugin-action, condition, delay,
/// transform) started by hand, by cron schedule or by webhook, and records
/// every execution in SQLite.

// Core configuration and setup
pub mod config;

// Typed errors shared by every layer
pub mod error;

// Workflow management layer - definitions, compiled graphs, storage and registry
pub mod workflow;

// Runtime execution engine - graph walk, node handlers, dispatch and scheduling
pub mod runtime;

// HTTP API layer - REST endpoints for workflows, executions and webhooks
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use config::Config;
pub use runtime::{ActionDispatcher, GraphExecutor, MemoryRecorder, VariableContext, WorkflowScheduler};
pub use server::start_server;
pub use workflow::{CompiledWorkflow, Edge, Execution, ExecutionStatus, Node, TriggerType, Workflow};
