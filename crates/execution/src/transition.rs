//! State machine transition validation for execution phases and node states.

use cascade_workflow::NodeState;

use crate::error::ExecutionError;
use crate::phase::ExecutionPhase;

/// Returns `true` if the execution-level transition from `from` to `to` is valid.
#[must_use]
pub fn can_transition_execution(from: ExecutionPhase, to: ExecutionPhase) -> bool {
    matches!(
        (from, to),
        (ExecutionPhase::Pending, ExecutionPhase::Planning)
            | (ExecutionPhase::Pending, ExecutionPhase::Executing)
            | (ExecutionPhase::Pending, ExecutionPhase::Cancelled)
            | (ExecutionPhase::Planning, ExecutionPhase::Executing)
            | (ExecutionPhase::Planning, ExecutionPhase::Failed)
            | (ExecutionPhase::Planning, ExecutionPhase::Cancelled)
            | (ExecutionPhase::Executing, ExecutionPhase::Finalizing)
            | (ExecutionPhase::Executing, ExecutionPhase::Completed)
            | (ExecutionPhase::Executing, ExecutionPhase::Failed)
            | (ExecutionPhase::Executing, ExecutionPhase::Cancelled)
            | (ExecutionPhase::Finalizing, ExecutionPhase::Completed)
            | (ExecutionPhase::Finalizing, ExecutionPhase::Failed)
    )
}

/// Validate an execution-level transition, returning an error if invalid.
pub fn validate_execution_transition(
    from: ExecutionPhase,
    to: ExecutionPhase,
) -> Result<(), ExecutionError> {
    if can_transition_execution(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Returns `true` if the node-level transition from `from` to `to` is valid.
///
/// Retries keep the node in `Retrying` between attempts; only events move
/// node state, so there is no `Retrying → Running` edge. A further failed
/// attempt re-enters `Retrying`. `Pending → Failed` covers binding failures,
/// which fail a node before its first attempt starts.
#[must_use]
pub fn can_transition_node(from: NodeState, to: NodeState) -> bool {
    matches!(
        (from, to),
        (NodeState::Pending, NodeState::Running)
            | (NodeState::Pending, NodeState::Skipped)
            | (NodeState::Pending, NodeState::Failed)
            | (NodeState::Running, NodeState::Completed)
            | (NodeState::Running, NodeState::Failed)
            | (NodeState::Running, NodeState::Retrying)
            | (NodeState::Retrying, NodeState::Completed)
            | (NodeState::Retrying, NodeState::Failed)
            | (NodeState::Retrying, NodeState::Retrying)
    )
}

/// Validate a node-level transition, returning an error if invalid.
pub fn validate_node_transition(from: NodeState, to: NodeState) -> Result<(), ExecutionError> {
    if can_transition_node(from, to) {
        Ok(())
    } else {
        Err(ExecutionError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ExecutionPhase::Pending, ExecutionPhase::Planning)]
    #[case(ExecutionPhase::Pending, ExecutionPhase::Executing)]
    #[case(ExecutionPhase::Planning, ExecutionPhase::Executing)]
    #[case(ExecutionPhase::Planning, ExecutionPhase::Failed)]
    #[case(ExecutionPhase::Executing, ExecutionPhase::Finalizing)]
    #[case(ExecutionPhase::Executing, ExecutionPhase::Completed)]
    #[case(ExecutionPhase::Executing, ExecutionPhase::Failed)]
    #[case(ExecutionPhase::Executing, ExecutionPhase::Cancelled)]
    #[case(ExecutionPhase::Finalizing, ExecutionPhase::Completed)]
    #[case(ExecutionPhase::Finalizing, ExecutionPhase::Failed)]
    fn valid_execution_transitions(#[case] from: ExecutionPhase, #[case] to: ExecutionPhase) {
        assert!(can_transition_execution(from, to));
    }

    #[rstest]
    #[case(ExecutionPhase::Pending, ExecutionPhase::Completed)]
    #[case(ExecutionPhase::Completed, ExecutionPhase::Executing)]
    #[case(ExecutionPhase::Failed, ExecutionPhase::Executing)]
    #[case(ExecutionPhase::Cancelled, ExecutionPhase::Pending)]
    #[case(ExecutionPhase::Finalizing, ExecutionPhase::Cancelled)]
    #[case(ExecutionPhase::Executing, ExecutionPhase::Executing)]
    fn invalid_execution_transitions(#[case] from: ExecutionPhase, #[case] to: ExecutionPhase) {
        assert!(!can_transition_execution(from, to));
    }

    #[test]
    fn terminal_phases_are_absorbing() {
        for terminal in [
            ExecutionPhase::Completed,
            ExecutionPhase::Failed,
            ExecutionPhase::Cancelled,
        ] {
            for target in [
                ExecutionPhase::Pending,
                ExecutionPhase::Planning,
                ExecutionPhase::Executing,
                ExecutionPhase::Finalizing,
                ExecutionPhase::Completed,
                ExecutionPhase::Failed,
                ExecutionPhase::Cancelled,
            ] {
                assert!(!can_transition_execution(terminal, target));
            }
        }
    }

    #[test]
    fn validate_execution_transition_err() {
        let err = validate_execution_transition(ExecutionPhase::Completed, ExecutionPhase::Pending)
            .unwrap_err();
        assert!(err.to_string().contains("invalid transition"));
    }

    #[rstest]
    #[case(NodeState::Pending, NodeState::Running)]
    #[case(NodeState::Pending, NodeState::Skipped)]
    #[case(NodeState::Pending, NodeState::Failed)]
    #[case(NodeState::Running, NodeState::Completed)]
    #[case(NodeState::Running, NodeState::Failed)]
    #[case(NodeState::Running, NodeState::Retrying)]
    #[case(NodeState::Retrying, NodeState::Completed)]
    #[case(NodeState::Retrying, NodeState::Failed)]
    #[case(NodeState::Retrying, NodeState::Retrying)]
    fn valid_node_transitions(#[case] from: NodeState, #[case] to: NodeState) {
        assert!(can_transition_node(from, to));
    }

    #[rstest]
    #[case(NodeState::Pending, NodeState::Completed)]
    #[case(NodeState::Completed, NodeState::Running)]
    #[case(NodeState::Skipped, NodeState::Running)]
    #[case(NodeState::Failed, NodeState::Running)]
    #[case(NodeState::Failed, NodeState::Retrying)]
    #[case(NodeState::Running, NodeState::Skipped)]
    fn invalid_node_transitions(#[case] from: NodeState, #[case] to: NodeState) {
        assert!(!can_transition_node(from, to));
    }
}
