/// Workflow Management Layer
///
/// Definitions and their validation, the compiled graph form the executor
/// walks, SQLite persistence, and the hot-reload registry.

// Core workflow type definitions
pub mod types;

// Petgraph arena built from a validated definition
pub mod graph;

// SQLite persistence for workflows and executions
pub mod storage;

// Hot-reload registry using ArcSwap for zero-downtime updates
pub mod registry;

pub use graph::CompiledWorkflow;
pub use registry::WorkflowRegistry;
pub use storage::WorkflowStorage;
pub use types::{Edge, Execution, ExecutionStatus, Node, NodeConfig, TriggerType, Workflow};
