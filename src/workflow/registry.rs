/// Hot-reload workflow registry using ArcSwap
///
/// Holds every stored workflow in compiled form. Readers take a lock-free
/// snapshot; writers clone the map, apply one change and swap the pointer, so
/// runs already in flight keep the version they started with.

use crate::workflow::graph::CompiledWorkflow;
use crate::workflow::{storage::WorkflowStorage, types::Workflow};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug)]
pub struct WorkflowRegistry {
    /// workflow_id -> compiled workflow
    workflows: ArcSwap<HashMap<String, Arc<CompiledWorkflow>>>,
    storage: WorkflowStorage,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage) -> Self {
        Self {
            workflows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Populate the registry from storage at startup
    ///
    /// A stored workflow that no longer compiles is logged and left out.
    pub async fn init_from_storage(&self) -> Result<()> {
        let stored = self.storage.load_all_workflows().await?;
        let mut compiled = HashMap::with_capacity(stored.len());

        for (id, workflow) in stored {
            match CompiledWorkflow::compile(workflow) {
                Ok(workflow) => {
                    compiled.insert(id, Arc::new(workflow));
                }
                Err(e) => tracing::warn!("⚠️ Workflow '{}' failed to compile, not registered: {}", id, e),
            }
        }

        self.workflows.store(Arc::new(compiled));
        tracing::info!("📚 Initialized workflow registry with {} workflows", self.len());
        Ok(())
    }

    /// Compile and register a workflow without touching storage
    pub fn insert(&self, workflow: Workflow) -> Result<Arc<CompiledWorkflow>> {
        let compiled = Arc::new(CompiledWorkflow::compile(workflow)?);
        let id = compiled.id().to_string();
        self.workflows.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(id.clone(), Arc::clone(&compiled));
            next
        });
        Ok(compiled)
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<CompiledWorkflow>> {
        self.workflows.load().get(workflow_id).cloned()
    }

    pub fn all_workflows(&self) -> Vec<Arc<CompiledWorkflow>> {
        self.workflows.load().values().cloned().collect()
    }

    /// Enabled workflows with a webhook trigger node of this id
    pub fn webhook_targets(&self, node_id: &str) -> Vec<Arc<CompiledWorkflow>> {
        let mut targets: Vec<_> = self
            .workflows
            .load()
            .values()
            .filter(|compiled| compiled.workflow.enabled && compiled.has_webhook_trigger(node_id))
            .cloned()
            .collect();
        targets.sort_by(|a, b| a.id().cmp(b.id()));
        targets
    }

    pub fn remove_workflow(&self, workflow_id: &str) -> bool {
        let mut removed = false;
        self.workflows.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = next.remove(workflow_id).is_some();
            next
        });
        if removed {
            tracing::info!("🗑️ Removed workflow from registry: {}", workflow_id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.workflows.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
