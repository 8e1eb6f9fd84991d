/// Petgraph representation of a workflow
///
/// A workflow is compiled once, when it enters the registry, into a `DiGraph`
/// arena plus an id -> index map. The executor only ever walks this graph; it
/// never searches the node or edge lists.

use crate::error::DefinitionError;
use crate::workflow::types::{Edge, Node, Workflow};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Execution-ready workflow
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    /// Definition as stored
    pub workflow: Workflow,
    graph: DiGraph<Node, Edge>,
    node_id_to_index: HashMap<String, NodeIndex>,
    /// Trigger nodes in declaration order
    triggers: Vec<NodeIndex>,
}

impl CompiledWorkflow {
    /// Build the graph, rejecting duplicate ids and dangling edges
    pub fn compile(workflow: Workflow) -> Result<Self, DefinitionError> {
        workflow.check_structure()?;

        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
        let mut node_id_to_index = HashMap::with_capacity(workflow.nodes.len());
        let mut triggers = Vec::new();

        for node in &workflow.nodes {
            let index = graph.add_node(node.clone());
            node_id_to_index.insert(node.id.clone(), index);
            if node.is_trigger() {
                triggers.push(index);
            }
        }

        for edge in &workflow.edges {
            // check_structure guarantees both endpoints exist
            if let (Some(&from), Some(&to)) = (
                node_id_to_index.get(&edge.source),
                node_id_to_index.get(&edge.target),
            ) {
                graph.add_edge(from, to, edge.clone());
            }
        }

        tracing::debug!(
            "📊 Compiled workflow '{}': {} nodes, {} edges, {} triggers",
            workflow.id,
            graph.node_count(),
            graph.edge_count(),
            triggers.len()
        );

        Ok(Self {
            workflow,
            graph,
            node_id_to_index,
            triggers,
        })
    }

    pub fn id(&self) -> &str {
        &self.workflow.id
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    pub fn index_of(&self, node_id: &str) -> Option<NodeIndex> {
        self.node_id_to_index.get(node_id).copied()
    }

    /// Where execution starts: every trigger node in declaration order, or
    /// the first node when there is no trigger
    ///
    /// The flag is `true` when the first-node fallback was used.
    pub fn entry_nodes(&self) -> (Vec<NodeIndex>, bool) {
        if !self.triggers.is_empty() {
            return (self.triggers.clone(), false);
        }
        (self.graph.node_indices().take(1).collect(), true)
    }

    /// Outgoing edges of a node in declaration order
    pub fn outgoing(&self, index: NodeIndex) -> Vec<(&Edge, NodeIndex)> {
        let mut edges: Vec<(EdgeIndex, &Edge, NodeIndex)> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| (e.id(), e.weight(), e.target()))
            .collect();
        edges.sort_by_key(|(ix, _, _)| *ix);
        edges.into_iter().map(|(_, edge, target)| (edge, target)).collect()
    }

    /// Whether `node_id` is a webhook trigger of this workflow
    pub fn has_webhook_trigger(&self, node_id: &str) -> bool {
        self.index_of(node_id)
            .is_some_and(|ix| self.graph[ix].is_webhook_trigger())
    }
}
