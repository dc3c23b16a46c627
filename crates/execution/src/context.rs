//! Runtime execution context (non-serializable).

use std::sync::Arc;

use cascade_core::ExecutionId;
use cascade_workflow::WorkflowDefinition;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutionError;
use crate::state::ExecutionState;

/// Runtime context for an executing workflow.
///
/// Holds the shared, internally-synchronized aggregate plus the cancellation
/// token every blocking operation selects against. Persistent state lives in
/// [`ExecutionState`]; this type is never serialized.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Unique identifier for this execution.
    pub execution_id: ExecutionId,
    /// The workflow definition being executed.
    pub workflow: Arc<WorkflowDefinition>,
    /// The shared aggregate. Sequence numbers are assigned while this lock
    /// is held, which is what makes them monotonic across worker tasks.
    pub state: Arc<Mutex<ExecutionState>>,
    /// Token for cooperative cancellation.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Create a context around a fresh aggregate.
    #[must_use]
    pub fn new(workflow: Arc<WorkflowDefinition>) -> Self {
        let execution_id = ExecutionId::v4();
        Self {
            execution_id,
            state: Arc::new(Mutex::new(ExecutionState::new(execution_id, workflow.id))),
            workflow,
            cancellation: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token (for caller-owned cancellation).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Run `f` with the aggregate locked.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut ExecutionState) -> T) -> T {
        let mut state = self.state.lock();
        f(&mut state)
    }

    /// Error out if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<(), ExecutionError> {
        if self.cancellation.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::TriggerId;
    use cascade_workflow::{NodeDefinition, NodeType};
    use cascade_core::NodeId;

    fn context() -> ExecutionContext {
        let workflow = WorkflowDefinition::new("ctx-test").with_nodes(vec![
            NodeDefinition::new(NodeId::v4(), "only", NodeType::Transform),
        ]);
        ExecutionContext::new(Arc::new(workflow))
    }

    #[test]
    fn new_context_wraps_fresh_state() {
        let ctx = context();
        ctx.with_state(|state| {
            assert_eq!(state.execution_id, ctx.execution_id);
            assert_eq!(state.workflow_id, ctx.workflow.id);
            assert_eq!(state.last_sequence(), 0);
        });
    }

    #[test]
    fn with_state_mutates_shared_aggregate() {
        let ctx = context();
        let node_id = ctx.workflow.nodes[0].id;
        ctx.with_state(|state| {
            state
                .record_started(TriggerId::v4(), vec![node_id], serde_json::Map::new())
                .unwrap();
        });

        let clone = ctx.clone();
        clone.with_state(|state| {
            assert_eq!(state.last_sequence(), 1);
        });
    }

    #[test]
    fn check_cancelled() {
        let ctx = context();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation.cancel();
        assert!(matches!(
            ctx.check_cancelled().unwrap_err(),
            ExecutionError::Cancelled
        ));
    }

    #[test]
    fn with_cancellation_links_external_token() {
        let token = CancellationToken::new();
        let ctx = context().with_cancellation(token.clone());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(ctx.check_cancelled().is_err());
    }
}
