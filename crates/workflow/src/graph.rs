//! Dependency graph: adjacency, validation, topological order, and waves.

use std::collections::{HashMap, HashSet, VecDeque};

use cascade_core::NodeId;
use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::definition::WorkflowDefinition;
use crate::edge::EdgeDefinition;
use crate::error::WorkflowError;

/// The directed acyclic graph behind a workflow definition.
///
/// Holds forward/reverse adjacency (via a petgraph `DiGraph`), a name index,
/// and the original edge definitions for condition and additional-source
/// lookups. Node iteration order everywhere is definition order, so sorts and
/// waves are deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    names: HashMap<String, NodeId>,
    order: Vec<NodeId>,
    edges: Vec<EdgeDefinition>,
}

impl DependencyGraph {
    /// Build the graph from a workflow definition.
    ///
    /// Checks referential integrity (unique node names, existing edge
    /// endpoints, no self-loops); structural validation beyond that is done
    /// by [`validate`](Self::validate).
    pub fn from_definition(workflow: &WorkflowDefinition) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::with_capacity(workflow.nodes.len());
        let mut names = HashMap::with_capacity(workflow.nodes.len());
        let mut order = Vec::with_capacity(workflow.nodes.len());

        for node in &workflow.nodes {
            if names.contains_key(&node.name) {
                return Err(WorkflowError::DuplicateNodeName(node.name.clone()));
            }
            let idx = graph.add_node(node.id);
            indices.insert(node.id, idx);
            names.insert(node.name.clone(), node.id);
            order.push(node.id);
        }

        for edge in &workflow.edges {
            if edge.from_node == edge.to_node {
                return Err(WorkflowError::InvalidEdge {
                    edge_id: edge.id,
                    reason: "self-loop".into(),
                });
            }
            let from = *indices.get(&edge.from_node).ok_or(WorkflowError::InvalidEdge {
                edge_id: edge.id,
                reason: format!("unknown source node {}", edge.from_node),
            })?;
            let to = *indices.get(&edge.to_node).ok_or(WorkflowError::InvalidEdge {
                edge_id: edge.id,
                reason: format!("unknown target node {}", edge.to_node),
            })?;
            graph.add_edge(from, to, ());
        }

        Ok(Self {
            graph,
            indices,
            names,
            order,
            edges: workflow.edges.clone(),
        })
    }

    /// Validate graph structure: non-empty, no isolated nodes (in multi-node
    /// graphs), acyclic, non-empty entry and exit sets, and every
    /// `include_outputs_from` name resolving to a proper ancestor of the
    /// edge's target.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.order.is_empty() {
            return Err(WorkflowError::Validation("workflow has no nodes".into()));
        }

        if self.order.len() > 1 {
            for &id in &self.order {
                if self.in_degree(id) == 0 && self.out_degree(id) == 0 {
                    return Err(WorkflowError::Validation(format!(
                        "node {id} is isolated (no incoming or outgoing edges)"
                    )));
                }
            }
        }

        if is_cyclic_directed(&self.graph) {
            return Err(WorkflowError::CyclicDependency(
                "workflow graph contains a cycle".into(),
            ));
        }

        if self.entry_nodes().is_empty() {
            return Err(WorkflowError::Validation(
                "workflow has no entry nodes".into(),
            ));
        }
        if self.exit_nodes().is_empty() {
            return Err(WorkflowError::Validation("workflow has no exit nodes".into()));
        }

        for edge in &self.edges {
            for name in edge.include_outputs_from() {
                let source = self
                    .node_id_by_name(name)
                    .ok_or_else(|| WorkflowError::NodeNotFound(name.to_string()))?;
                if source == edge.to_node {
                    return Err(WorkflowError::Validation(format!(
                        "include_outputs_from entry '{name}' refers to the edge's own target"
                    )));
                }
                if !self.is_ancestor(source, edge.to_node) {
                    return Err(WorkflowError::Validation(format!(
                        "include_outputs_from entry '{name}' is not an ancestor of the edge target"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Node IDs in definition order.
    #[must_use]
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Returns `true` if the node belongs to this graph.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.indices.contains_key(&node)
    }

    /// Look up a node ID by its unique name.
    #[must_use]
    pub fn node_id_by_name(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Nodes with no incoming edges, in definition order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.in_degree(id) == 0)
            .collect()
    }

    /// Nodes with no outgoing edges, in definition order.
    #[must_use]
    pub fn exit_nodes(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&id| self.out_degree(id) == 0)
            .collect()
    }

    /// Direct predecessors of a node.
    #[must_use]
    pub fn predecessors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Incoming)
    }

    /// Direct successors of a node.
    #[must_use]
    pub fn successors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: NodeId, dir: Direction) -> Vec<NodeId> {
        let Some(&idx) = self.indices.get(&node) else {
            return Vec::new();
        };
        let mut out: Vec<NodeId> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n])
            .collect();
        // neighbors_directed yields in reverse insertion order; flip for
        // deterministic definition-ordered output.
        out.reverse();
        out
    }

    /// Number of incoming edges (parallel edges counted).
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.indices.get(&node).map_or(0, |&idx| {
            self.graph.edges_directed(idx, Direction::Incoming).count()
        })
    }

    /// Number of outgoing edges (parallel edges counted).
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.indices.get(&node).map_or(0, |&idx| {
            self.graph.edges_directed(idx, Direction::Outgoing).count()
        })
    }

    /// Returns `true` if the node has more than one incoming edge.
    #[must_use]
    pub fn is_join_node(&self, node: NodeId) -> bool {
        self.in_degree(node) > 1
    }

    /// Returns `true` if the node has more than one outgoing edge.
    #[must_use]
    pub fn is_fork_node(&self, node: NodeId) -> bool {
        self.out_degree(node) > 1
    }

    /// Edge definitions pointing at `node`.
    #[must_use]
    pub fn incoming_edges(&self, node: NodeId) -> Vec<&EdgeDefinition> {
        self.edges.iter().filter(|e| e.to_node == node).collect()
    }

    /// Edge definitions leaving `node`.
    #[must_use]
    pub fn outgoing_edges(&self, node: NodeId) -> Vec<&EdgeDefinition> {
        self.edges.iter().filter(|e| e.from_node == node).collect()
    }

    /// Returns `true` if `ancestor` can reach `descendant` through forward
    /// edges. BFS; a node is not its own ancestor.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> bool {
        if ancestor == descendant {
            return false;
        }
        let Some(&start) = self.indices.get(&ancestor) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if self.graph[next] == descendant {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Topological order via Kahn's algorithm.
    ///
    /// Ties are broken by definition order, so the result is stable across
    /// runs. Fails with [`WorkflowError::CyclicDependency`] on cycles.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, WorkflowError> {
        let mut in_degrees: HashMap<NodeId, usize> = self
            .order
            .iter()
            .map(|&id| (id, self.in_degree(id)))
            .collect();

        let mut queue: VecDeque<NodeId> = self
            .order
            .iter()
            .copied()
            .filter(|id| in_degrees[id] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for succ in self.successors(id) {
                let degree = in_degrees
                    .get_mut(&succ)
                    .ok_or_else(|| WorkflowError::NodeNotFound(succ.to_string()))?;
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(succ);
                }
            }
        }

        if sorted.len() != self.order.len() {
            return Err(WorkflowError::CyclicDependency(format!(
                "{} nodes unreachable from entry set",
                self.order.len() - sorted.len()
            )));
        }
        Ok(sorted)
    }

    /// Compute execution waves: each wave holds every not-yet-processed node
    /// whose predecessors have all been processed, in definition order.
    ///
    /// All nodes in one wave can run concurrently. Fails with
    /// [`WorkflowError::CyclicDependency`] if a round makes no progress.
    pub fn compute_waves(&self) -> Result<Vec<Vec<NodeId>>, WorkflowError> {
        let mut waves = Vec::new();
        let mut processed: HashSet<NodeId> = HashSet::with_capacity(self.order.len());

        while processed.len() < self.order.len() {
            let wave: Vec<NodeId> = self
                .order
                .iter()
                .copied()
                .filter(|id| !processed.contains(id))
                .filter(|&id| self.predecessors(id).iter().all(|p| processed.contains(p)))
                .collect();

            if wave.is_empty() {
                return Err(WorkflowError::CyclicDependency(format!(
                    "{} nodes never become ready",
                    self.order.len() - processed.len()
                )));
            }
            processed.extend(wave.iter().copied());
            waves.push(wave);
        }

        Ok(waves)
    }
}
