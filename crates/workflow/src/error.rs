//! Workflow definition and graph error types.

use cascade_core::EdgeId;
use thiserror::Error;

/// Errors raised while building or validating workflow structure.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The definition violates a structural rule.
    #[error("validation: {0}")]
    Validation(String),

    /// The graph contains a cycle.
    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),

    /// A referenced node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Two nodes share the same name.
    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),

    /// An edge references a missing endpoint or loops onto itself.
    #[error("invalid edge {edge_id}: {reason}")]
    InvalidEdge {
        /// The offending edge.
        edge_id: EdgeId,
        /// What is wrong with it.
        reason: String,
    },

    /// A lifecycle transition is not allowed.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}
