//! Lifecycle state enums for workflows and nodes.

use serde::{Deserialize, Serialize};

/// Publication state of a workflow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    /// Editable; cannot be executed.
    Draft,
    /// Frozen and executable.
    Published,
    /// Retired; kept for history, cannot be executed.
    Archived,
}

impl WorkflowState {
    /// Returns `true` if a workflow in this state may be executed.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Published)
    }

    /// Returns `true` if the transition from `self` to `to` is valid.
    #[must_use]
    pub fn can_transition_to(&self, to: WorkflowState) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Published) | (Self::Published, Self::Archived)
        )
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// The execution state of a single node.
///
/// Lifecycle: `Pending → Running → (Completed | Failed | Retrying → Running …)`.
/// `Skipped` is terminal and entered directly from `Pending` when no incoming
/// conditional edge is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not yet scheduled.
    Pending,
    /// An attempt is in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an unrecovered error.
    Failed,
    /// Will never run (conditional gating excluded it).
    Skipped,
    /// Between failed attempt and the next one.
    Retrying,
}

impl NodeState {
    /// Returns `true` if the node has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Returns `true` if the node is currently doing or about to do work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_state_executable() {
        assert!(WorkflowState::Published.is_executable());
        assert!(!WorkflowState::Draft.is_executable());
        assert!(!WorkflowState::Archived.is_executable());
    }

    #[test]
    fn workflow_state_transitions() {
        assert!(WorkflowState::Draft.can_transition_to(WorkflowState::Published));
        assert!(WorkflowState::Published.can_transition_to(WorkflowState::Archived));

        assert!(!WorkflowState::Draft.can_transition_to(WorkflowState::Archived));
        assert!(!WorkflowState::Archived.can_transition_to(WorkflowState::Published));
        assert!(!WorkflowState::Published.can_transition_to(WorkflowState::Draft));
    }

    #[test]
    fn node_terminal_states() {
        assert!(NodeState::Completed.is_terminal());
        assert!(NodeState::Failed.is_terminal());
        assert!(NodeState::Skipped.is_terminal());

        assert!(!NodeState::Pending.is_terminal());
        assert!(!NodeState::Running.is_terminal());
        assert!(!NodeState::Retrying.is_terminal());
    }

    #[test]
    fn node_active_states() {
        assert!(NodeState::Running.is_active());
        assert!(NodeState::Retrying.is_active());
        assert!(!NodeState::Pending.is_active());
        assert!(!NodeState::Completed.is_active());
    }

    #[test]
    fn node_state_serde_snake_case() {
        let json = serde_json::to_string(&NodeState::Retrying).unwrap();
        assert_eq!(json, "\"retrying\"");
        let back: NodeState = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(back, NodeState::Skipped);
    }

    #[test]
    fn display_formatting() {
        assert_eq!(NodeState::Pending.to_string(), "pending");
        assert_eq!(NodeState::Completed.to_string(), "completed");
        assert_eq!(WorkflowState::Published.to_string(), "published");
    }
}
