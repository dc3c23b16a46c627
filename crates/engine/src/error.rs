//! Engine error types and retryability classification.

use std::time::Duration;

use cascade_execution::ExecutionError;
use cascade_expression::ExpressionError;
use cascade_resilience::ResilienceError;
use cascade_storage::StorageError;
use cascade_workflow::WorkflowError;
use thiserror::Error;

/// Errors raised while planning or executing a workflow.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow, plan, trigger, or an input is malformed. Fatal, never
    /// retried.
    #[error("validation: {0}")]
    Validation(String),

    /// A required executor or referenced entity is missing. Fatal for the
    /// failing node.
    #[error("not found: {0}")]
    NotFound(String),

    /// Structural workflow error (including cyclic dependencies).
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// A domain failure reported by a node executor. Subject to retry
    /// policy and error strategy.
    #[error("node execution: {0}")]
    NodeExecution(String),

    /// A node call exceeded its timeout. Retryable unless policy excludes.
    #[error("node timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The enforced timeout.
        timeout: Duration,
    },

    /// The circuit breaker rejected the call. Transient; not counted toward
    /// retry attempts.
    #[error("circuit breaker open (retry after {retry_after:?})")]
    CircuitBreakerOpen {
        /// Remaining cooldown, if known.
        retry_after: Option<Duration>,
    },

    /// The execution was cancelled. Fatal and terminal.
    #[error("execution cancelled")]
    Cancelled,

    /// The event store failed; the engine cannot guarantee durability.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Aggregate state rejected a mutation.
    #[error(transparent)]
    State(#[from] ExecutionError),
}

impl EngineError {
    /// Returns `true` for errors the retry policy may act on.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NodeExecution(_) | Self::Timeout { .. })
    }
}

impl From<ExpressionError> for EngineError {
    fn from(err: ExpressionError) -> Self {
        // Expression problems are configuration problems: fatal, not retried.
        Self::Validation(err.to_string())
    }
}

impl From<ResilienceError> for EngineError {
    fn from(err: ResilienceError) -> Self {
        match err {
            ResilienceError::CircuitBreakerOpen { retry_after } => {
                Self::CircuitBreakerOpen { retry_after }
            }
            ResilienceError::Cancelled => Self::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_classification() {
        assert!(EngineError::NodeExecution("boom".into()).is_retryable());
        assert!(
            EngineError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_retryable()
        );

        assert!(!EngineError::Validation("bad".into()).is_retryable());
        assert!(!EngineError::NotFound("missing".into()).is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(
            !EngineError::CircuitBreakerOpen { retry_after: None }.is_retryable()
        );
    }

    #[test]
    fn expression_errors_become_validation() {
        let err: EngineError = ExpressionError::VariableNotFound("x".into()).into();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn breaker_open_conversion_preserves_cooldown() {
        let err: EngineError = ResilienceError::CircuitBreakerOpen {
            retry_after: Some(Duration::from_secs(5)),
        }
        .into();
        assert!(matches!(
            err,
            EngineError::CircuitBreakerOpen { retry_after: Some(d) } if d == Duration::from_secs(5)
        ));
    }
}
