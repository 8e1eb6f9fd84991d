/// Execution persistence seam
///
/// The executor writes an execution twice: once when it starts running and
/// once when it reaches a terminal status. `WorkflowStorage` is the production
/// implementation; `MemoryRecorder` keeps records in a map.

use crate::workflow::types::Execution;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait ExecutionRecorder: Send + Sync {
    /// Persist a freshly started (running) execution
    async fn record_start(&self, execution: &Execution) -> Result<()>;

    /// Persist the terminal state of an execution
    async fn record_finish(&self, execution: &Execution) -> Result<()>;
}

/// In-memory recorder for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    executions: Mutex<HashMap<String, Execution>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Execution> {
        self.executions
            .lock()
            .ok()
            .and_then(|map| map.get(id).cloned())
    }

    pub fn len(&self) -> usize {
        self.executions.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExecutionRecorder for MemoryRecorder {
    async fn record_start(&self, execution: &Execution) -> Result<()> {
        let mut map = self
            .executions
            .lock()
            .map_err(|_| anyhow::anyhow!("execution map poisoned"))?;
        map.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn record_finish(&self, execution: &Execution) -> Result<()> {
        let mut map = self
            .executions
            .lock()
            .map_err(|_| anyhow::anyhow!("execution map poisoned"))?;
        // terminal rows are never rewritten
        if let Some(existing) = map.get(&execution.id) {
            if existing.status.is_terminal() {
                return Ok(());
            }
        }
        map.insert(execution.id.clone(), execution.clone());
        Ok(())
    }
}
