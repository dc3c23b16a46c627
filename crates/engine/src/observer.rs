//! Best-effort execution observer hooks.

use cascade_core::{ExecutionId, NodeId, WorkflowId};

/// Hooks invoked as the engine records events.
///
/// All hooks are best-effort: they run synchronously on the engine's task,
/// must not block, and their panics or side effects never influence
/// execution. Every method has a no-op default, so observers implement only
/// what they care about.
#[allow(unused_variables)]
pub trait ExecutionObserver: Send + Sync {
    /// The execution left `Pending`.
    fn on_execution_started(&self, execution_id: ExecutionId, workflow_id: WorkflowId) {}

    /// The execution completed successfully.
    fn on_execution_completed(&self, execution_id: ExecutionId) {}

    /// The execution failed.
    fn on_execution_failed(&self, execution_id: ExecutionId, error: &str) {}

    /// The execution was cancelled.
    fn on_execution_cancelled(&self, execution_id: ExecutionId, reason: &str) {}

    /// A node began its first attempt.
    fn on_node_started(&self, execution_id: ExecutionId, node_id: NodeId, node_name: &str) {}

    /// A node finished successfully.
    fn on_node_completed(&self, execution_id: ExecutionId, node_id: NodeId, node_name: &str) {}

    /// A node failed terminally.
    fn on_node_failed(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
        node_name: &str,
        error: &str,
    ) {
    }

    /// A node is about to make another attempt.
    fn on_node_retrying(
        &self,
        execution_id: ExecutionId,
        node_id: NodeId,
        node_name: &str,
        attempt: u32,
    ) {
    }

    /// A node was skipped by conditional gating.
    fn on_node_skipped(&self, execution_id: ExecutionId, node_id: NodeId, node_name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;
    impl ExecutionObserver for Silent {}

    #[test]
    fn default_hooks_are_no_ops() {
        let observer = Silent;
        let execution = ExecutionId::v4();
        observer.on_execution_started(execution, WorkflowId::v4());
        observer.on_node_started(execution, NodeId::v4(), "n");
        observer.on_node_failed(execution, NodeId::v4(), "n", "err");
        observer.on_execution_completed(execution);
    }
}
