//! Node readiness assessment for wave-driven and dynamic scheduling.

use cascade_execution::ExecutionState;
use cascade_expression::{Condition, EvaluationContext};
use cascade_workflow::{
    DependencyGraph, EdgeDefinition, JoinStrategy, NodeDefinition, NodeState,
    WorkflowDefinition,
};
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Whether a node can run right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeReadiness {
    /// All dependencies are satisfied.
    Ready,
    /// Some incoming edge is still undecided.
    Waiting,
    /// The node will never become ready.
    Skip(String),
}

/// Static waves are sufficient unless conditional routing or a non-WAIT_ALL
/// join makes readiness data-dependent.
#[must_use]
pub fn requires_dynamic_scheduling(
    workflow: &WorkflowDefinition,
    graph: &DependencyGraph,
) -> bool {
    workflow.edges.iter().any(EdgeDefinition::is_conditional)
        || workflow.nodes.iter().any(|n| {
            graph.is_join_node(n.id) && n.join_strategy() != JoinStrategy::WaitAll
        })
}

/// Assess one node against the current execution state.
///
/// Incoming-edge activation:
/// - an edge from a completed source is active — for conditional edges, only
///   when the condition holds over the source's output;
/// - an edge from a skipped source is inactive (skips cascade);
/// - an edge from a failed source counts as settled-active, so downstream
///   nodes proceed to binding (and fail there if the missing output matters);
/// - anything else leaves the edge undecided.
pub fn assess(
    node: &NodeDefinition,
    graph: &DependencyGraph,
    state: &ExecutionState,
) -> Result<NodeReadiness, EngineError> {
    let incoming = graph.incoming_edges(node.id);
    if incoming.is_empty() {
        return Ok(NodeReadiness::Ready);
    }

    let mut active = 0usize;
    let mut undecided = 0usize;
    for edge in &incoming {
        let Some(source) = state.node_state(edge.from_node) else {
            undecided += 1;
            continue;
        };
        match source.state {
            NodeState::Pending | NodeState::Running | NodeState::Retrying => undecided += 1,
            NodeState::Skipped => {}
            NodeState::Failed => {
                if !edge.is_conditional() {
                    active += 1;
                }
            }
            NodeState::Completed => match edge.condition() {
                None => active += 1,
                Some(condition) => {
                    let env = edge_environment(state, state.node_output(edge.from_node));
                    if Condition::compile(condition)?.evaluate_bool(&env)? {
                        active += 1;
                    }
                }
            },
        }
    }

    let readiness = if graph.is_join_node(node.id) {
        match node.join_strategy() {
            JoinStrategy::WaitAll => {
                if undecided > 0 {
                    NodeReadiness::Waiting
                } else if active > 0 {
                    NodeReadiness::Ready
                } else {
                    NodeReadiness::Skip("no active incoming edge".into())
                }
            }
            JoinStrategy::WaitAny | JoinStrategy::WaitFirst => {
                if active > 0 {
                    NodeReadiness::Ready
                } else if undecided > 0 {
                    NodeReadiness::Waiting
                } else {
                    NodeReadiness::Skip("no active incoming edge".into())
                }
            }
            JoinStrategy::WaitN => {
                let needed = node.min_required();
                if active >= needed {
                    NodeReadiness::Ready
                } else if active + undecided >= needed {
                    NodeReadiness::Waiting
                } else {
                    NodeReadiness::Skip(format!(
                        "join needs {needed} branches, at most {} can still activate",
                        active + undecided
                    ))
                }
            }
        }
    } else if undecided > 0 {
        NodeReadiness::Waiting
    } else if active > 0 {
        NodeReadiness::Ready
    } else {
        NodeReadiness::Skip("no active incoming edge".into())
    };
    Ok(readiness)
}

/// The variable environment conditional edges are evaluated against:
/// globals, then every completed node's output under its name, then the
/// edge source's output flattened to the top level (plus `output` as the
/// whole map), so both `score > 0.5` and `output.ok` styles resolve.
#[must_use]
pub fn edge_environment(
    state: &ExecutionState,
    source_output: Option<&Map<String, Value>>,
) -> EvaluationContext {
    let mut env_map = state.globals.to_map();
    env_map.extend(state.variables.to_map());
    if let Some(output) = source_output {
        for (key, value) in output {
            env_map.insert(key.clone(), value.clone());
        }
        env_map.insert("output".into(), Value::Object(output.clone()));
    }
    EvaluationContext::from_map(env_map)
}
