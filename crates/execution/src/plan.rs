//! Execution planning — builds a parallel execution schedule from a workflow.

use cascade_core::{NodeId, WorkflowId};
use cascade_workflow::{DependencyGraph, WorkflowDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ExecutionError;

/// A pre-computed execution plan derived from a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Workflow this plan was derived from.
    pub workflow_id: WorkflowId,
    /// Waves of nodes; each wave can run concurrently.
    pub waves: Vec<Vec<NodeId>>,
    /// Nodes with no predecessors.
    pub entry_nodes: Vec<NodeId>,
    /// Nodes with no successors.
    pub exit_nodes: Vec<NodeId>,
    /// Total number of nodes in the plan.
    pub total_nodes: usize,
    /// Width of the widest wave.
    pub max_parallel: usize,
    /// Number of waves.
    pub depth: usize,
    /// When this plan was created.
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Build an execution plan from a workflow definition.
    pub fn from_workflow(workflow: &WorkflowDefinition) -> Result<Self, ExecutionError> {
        let graph = workflow
            .build_graph()
            .map_err(|e| ExecutionError::PlanValidation(format!("graph construction: {e}")))?;
        Self::from_graph(workflow.id, &graph)
    }

    /// Build an execution plan from an already-validated graph.
    pub fn from_graph(
        workflow_id: WorkflowId,
        graph: &DependencyGraph,
    ) -> Result<Self, ExecutionError> {
        let waves = graph
            .compute_waves()
            .map_err(|e| ExecutionError::PlanValidation(format!("wave computation: {e}")))?;

        let max_parallel = waves.iter().map(Vec::len).max().unwrap_or(0);
        Ok(Self {
            workflow_id,
            depth: waves.len(),
            max_parallel,
            total_nodes: graph.node_count(),
            entry_nodes: graph.entry_nodes(),
            exit_nodes: graph.exit_nodes(),
            waves,
            created_at: Utc::now(),
        })
    }

    /// Assert that every graph node appears in exactly one wave.
    pub fn validate(&self, graph: &DependencyGraph) -> Result<(), ExecutionError> {
        let mut seen: HashMap<NodeId, usize> = HashMap::new();
        for wave in &self.waves {
            for &node in wave {
                *seen.entry(node).or_default() += 1;
            }
        }
        for &node in graph.node_ids() {
            match seen.get(&node) {
                Some(1) => {}
                Some(n) => {
                    return Err(ExecutionError::PlanValidation(format!(
                        "node {node} appears in {n} waves"
                    )));
                }
                None => {
                    return Err(ExecutionError::PlanValidation(format!(
                        "node {node} missing from plan"
                    )));
                }
            }
        }
        if seen.len() != graph.node_count() {
            return Err(ExecutionError::PlanValidation(
                "plan contains nodes not in the graph".into(),
            ));
        }
        Ok(())
    }

    /// Longest dependency chain (by node count) via topological traversal.
    pub fn critical_path(&self, graph: &DependencyGraph) -> Result<Vec<NodeId>, ExecutionError> {
        let order = graph
            .topological_sort()
            .map_err(|e| ExecutionError::PlanValidation(e.to_string()))?;

        let mut longest_to: HashMap<NodeId, usize> = HashMap::new();
        let mut best_pred: HashMap<NodeId, NodeId> = HashMap::new();
        for &node in &order {
            let (length, pred) = graph
                .predecessors(node)
                .into_iter()
                .map(|p| (longest_to[&p] + 1, p))
                .max_by_key(|(length, _)| *length)
                .map_or((1, None), |(length, p)| (length, Some(p)));
            longest_to.insert(node, length);
            if let Some(p) = pred {
                best_pred.insert(node, p);
            }
        }

        let Some((&tail, _)) = longest_to.iter().max_by_key(|&(_, &length)| length) else {
            return Ok(Vec::new());
        };
        let mut path = vec![tail];
        let mut current = tail;
        while let Some(&pred) = best_pred.get(&current) {
            path.push(pred);
            current = pred;
        }
        path.reverse();
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_workflow::{EdgeDefinition, NodeDefinition, NodeType};
    use pretty_assertions::assert_eq;

    fn node(id: NodeId, name: &str) -> NodeDefinition {
        NodeDefinition::new(id, name, NodeType::Transform)
    }

    fn workflow(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> WorkflowDefinition {
        WorkflowDefinition::new("plan-test")
            .with_nodes(nodes)
            .with_edges(edges)
    }

    #[test]
    fn plan_from_linear_workflow() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c")],
            vec![EdgeDefinition::direct(a, b), EdgeDefinition::direct(b, c)],
        );
        let plan = ExecutionPlan::from_workflow(&wf).unwrap();

        assert_eq!(plan.total_nodes, 3);
        assert_eq!(plan.depth, 3);
        assert_eq!(plan.max_parallel, 1);
        assert_eq!(plan.entry_nodes, vec![a]);
        assert_eq!(plan.exit_nodes, vec![c]);
    }

    #[test]
    fn plan_from_diamond_workflow() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let c = NodeId::v4();
        let d = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c"), node(d, "d")],
            vec![
                EdgeDefinition::direct(a, b),
                EdgeDefinition::direct(a, c),
                EdgeDefinition::direct(b, d),
                EdgeDefinition::direct(c, d),
            ],
        );
        let plan = ExecutionPlan::from_workflow(&wf).unwrap();

        assert_eq!(plan.depth, 3);
        assert_eq!(plan.max_parallel, 2);
        assert_eq!(plan.waves[1], vec![b, c]);
    }

    #[test]
    fn plan_rejects_cyclic_workflow() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b")],
            vec![EdgeDefinition::direct(a, b), EdgeDefinition::direct(b, a)],
        );
        let err = ExecutionPlan::from_workflow(&wf).unwrap_err();
        assert!(err.to_string().contains("plan validation"));
    }

    #[test]
    fn plan_validates_against_graph() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b")],
            vec![EdgeDefinition::direct(a, b)],
        );
        let graph = wf.build_graph().unwrap();
        let mut plan = ExecutionPlan::from_workflow(&wf).unwrap();
        plan.validate(&graph).unwrap();

        // A duplicated node is caught.
        plan.waves.push(vec![a]);
        assert!(plan.validate(&graph).is_err());

        // A missing node is caught.
        plan.waves = vec![vec![a]];
        assert!(plan.validate(&graph).is_err());
    }

    #[test]
    fn critical_path_of_uneven_dag() {
        // a -> b -> d, a -> c -> e -> d: the long arm wins.
        let ids: Vec<NodeId> = (0..5).map(|_| NodeId::v4()).collect();
        let (a, b, c, d, e) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
        let wf = workflow(
            vec![node(a, "a"), node(b, "b"), node(c, "c"), node(d, "d"), node(e, "e")],
            vec![
                EdgeDefinition::direct(a, b),
                EdgeDefinition::direct(b, d),
                EdgeDefinition::direct(a, c),
                EdgeDefinition::direct(c, e),
                EdgeDefinition::direct(e, d),
            ],
        );
        let graph = wf.build_graph().unwrap();
        let plan = ExecutionPlan::from_workflow(&wf).unwrap();
        let path = plan.critical_path(&graph).unwrap();

        assert_eq!(path, vec![a, c, e, d]);
    }

    #[test]
    fn plan_serde_roundtrip() {
        let a = NodeId::v4();
        let b = NodeId::v4();
        let wf = workflow(
            vec![node(a, "a"), node(b, "b")],
            vec![EdgeDefinition::direct(a, b)],
        );
        let plan = ExecutionPlan::from_workflow(&wf).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: ExecutionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.workflow_id, plan.workflow_id);
        assert_eq!(back.waves, plan.waves);
        assert_eq!(back.total_nodes, 2);
    }
}
