//! Execution error types.

use cascade_core::NodeId;
use thiserror::Error;

/// Errors that can occur while mutating or replaying execution state.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A state transition is not valid for the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// A referenced node does not exist in the execution state.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// An event arrived out of sequence.
    #[error("event sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// The next sequence the aggregate would accept.
        expected: u64,
        /// The sequence actually seen.
        got: u64,
    },

    /// An event belongs to a different execution.
    #[error("event for execution {got} applied to execution {expected}")]
    WrongExecution {
        /// The aggregate's execution.
        expected: cascade_core::ExecutionId,
        /// The event's execution.
        got: cascade_core::ExecutionId,
    },

    /// The execution plan failed validation.
    #[error("plan validation: {0}")]
    PlanValidation(String),

    /// A mutation was attempted on a read-only variable set.
    #[error("variable set is read-only")]
    ReadOnlyVariables,

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The execution was cancelled.
    #[error("execution cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let err = ExecutionError::InvalidTransition {
            from: "completed".into(),
            to: "executing".into(),
        };
        assert_eq!(err.to_string(), "invalid transition from completed to executing");
    }

    #[test]
    fn sequence_gap_display() {
        let err = ExecutionError::SequenceGap { expected: 4, got: 7 };
        assert_eq!(err.to_string(), "event sequence gap: expected 4, got 7");
    }

    #[test]
    fn node_not_found_display() {
        let err = ExecutionError::NodeNotFound(NodeId::nil());
        assert!(err.to_string().contains("node not found"));
    }
}
