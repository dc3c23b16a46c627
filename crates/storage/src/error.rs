//! Storage error types.

use cascade_core::ExecutionId;
use thiserror::Error;

/// Errors raised by event store and repository implementations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An appended batch does not continue the stored sequence.
    #[error("sequence conflict for execution {execution_id}: expected {expected}, got {got}")]
    SequenceConflict {
        /// The affected execution.
        execution_id: ExecutionId,
        /// The next sequence the store would accept.
        expected: u64,
        /// The sequence actually seen.
        got: u64,
    },

    /// A requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend failed.
    #[error("storage backend: {0}")]
    Backend(String),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_conflict_display() {
        let err = StorageError::SequenceConflict {
            execution_id: ExecutionId::nil(),
            expected: 3,
            got: 5,
        };
        assert!(err.to_string().contains("expected 3, got 5"));
    }

    #[test]
    fn not_found_display() {
        assert_eq!(
            StorageError::NotFound("workflow abc".into()).to_string(),
            "not found: workflow abc"
        );
    }
}
