//! Execution-level phase tracking.

use serde::{Deserialize, Serialize};

/// The overall phase of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Created but not yet started.
    Pending,
    /// Validating the workflow and building the plan.
    Planning,
    /// Running waves of nodes.
    Executing,
    /// All waves settled; producing the terminal result.
    Finalizing,
    /// Every required node completed.
    Completed,
    /// An unrecovered error ended the execution.
    Failed,
    /// A cancellation request ended the execution.
    Cancelled,
}

impl ExecutionPhase {
    /// Returns `true` if the phase is absorbing.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` while the execution is doing work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Planning | Self::Executing | Self::Finalizing)
    }

    /// Returns `true` if the execution finished successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Planning => write!(f, "planning"),
            Self::Executing => write!(f, "executing"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(ExecutionPhase::Completed.is_terminal());
        assert!(ExecutionPhase::Failed.is_terminal());
        assert!(ExecutionPhase::Cancelled.is_terminal());

        assert!(!ExecutionPhase::Pending.is_terminal());
        assert!(!ExecutionPhase::Planning.is_terminal());
        assert!(!ExecutionPhase::Executing.is_terminal());
        assert!(!ExecutionPhase::Finalizing.is_terminal());
    }

    #[test]
    fn active_phases() {
        assert!(ExecutionPhase::Planning.is_active());
        assert!(ExecutionPhase::Executing.is_active());
        assert!(ExecutionPhase::Finalizing.is_active());
        assert!(!ExecutionPhase::Pending.is_active());
        assert!(!ExecutionPhase::Completed.is_active());
    }

    #[test]
    fn serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionPhase::Executing).unwrap(),
            "\"executing\""
        );
        let back: ExecutionPhase = serde_json::from_str("\"finalizing\"").unwrap();
        assert_eq!(back, ExecutionPhase::Finalizing);
    }

    #[test]
    fn display_formatting() {
        assert_eq!(ExecutionPhase::Pending.to_string(), "pending");
        assert_eq!(ExecutionPhase::Cancelled.to_string(), "cancelled");
    }
}
