//! Per-execution error strategies.

use cascade_core::NodeId;
use serde::{Deserialize, Serialize};

/// Policy deciding how node failures affect the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Any failure aborts the wave and the execution.
    FailFast,
    /// Failures are collected; the execution keeps going. Downstream nodes
    /// whose required inputs disappear fail to bind.
    ContinueOnError,
    /// Like `ContinueOnError`, but successes and failures are tracked
    /// separately and summarized at the end.
    BestEffort,
    /// Abort as soon as reaching `min_successes` becomes mathematically
    /// impossible; succeed only if it was reached.
    RequireN {
        /// Successes required for the execution to pass.
        min_successes: usize,
    },
}

/// What the strategy wants the engine to do after a node settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyDecision {
    /// Keep executing.
    Continue,
    /// Abort the wave and fail the execution.
    Abort(String),
}

/// Running tally of node outcomes for one execution.
#[derive(Debug, Clone)]
pub struct StrategyState {
    strategy: ErrorStrategy,
    total_nodes: usize,
    successes: usize,
    skipped: usize,
    failures: Vec<(NodeId, String)>,
}

impl StrategyState {
    /// Create a tally for an execution of `total_nodes` nodes.
    #[must_use]
    pub fn new(strategy: ErrorStrategy, total_nodes: usize) -> Self {
        Self {
            strategy,
            total_nodes,
            successes: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    /// The strategy in force.
    #[must_use]
    pub fn strategy(&self) -> ErrorStrategy {
        self.strategy
    }

    /// Record a node success.
    pub fn on_node_success(&mut self) {
        self.successes += 1;
    }

    /// Record a node skip (it can no longer contribute a success).
    pub fn on_node_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Record a node failure and decide whether to keep going.
    pub fn on_node_failure(&mut self, node_id: NodeId, error: &str) -> StrategyDecision {
        self.failures.push((node_id, error.to_string()));
        match self.strategy {
            ErrorStrategy::FailFast => {
                StrategyDecision::Abort(format!("node {node_id} failed: {error}"))
            }
            ErrorStrategy::ContinueOnError | ErrorStrategy::BestEffort => {
                StrategyDecision::Continue
            }
            ErrorStrategy::RequireN { min_successes } => {
                if self.max_possible_successes() < min_successes {
                    StrategyDecision::Abort(format!(
                        "{} successes are no longer reachable ({} failed, {} skipped)",
                        min_successes,
                        self.failures.len(),
                        self.skipped,
                    ))
                } else {
                    StrategyDecision::Continue
                }
            }
        }
    }

    /// Final verdict once every node has settled.
    pub fn finalize(&self) -> Result<(), String> {
        match self.strategy {
            ErrorStrategy::FailFast => match self.failures.first() {
                None => Ok(()),
                Some((node_id, error)) => Err(format!("node {node_id} failed: {error}")),
            },
            ErrorStrategy::ContinueOnError | ErrorStrategy::BestEffort => Ok(()),
            ErrorStrategy::RequireN { min_successes } => {
                if self.successes >= min_successes {
                    Ok(())
                } else {
                    Err(format!(
                        "required {} successes, got {}",
                        min_successes, self.successes
                    ))
                }
            }
        }
    }

    /// Successes so far.
    #[must_use]
    pub fn successes(&self) -> usize {
        self.successes
    }

    /// Failures so far.
    #[must_use]
    pub fn failures(&self) -> &[(NodeId, String)] {
        &self.failures
    }

    /// Summary line for logging (`succeeded/failed/skipped of total`).
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped of {} nodes",
            self.successes,
            self.failures.len(),
            self.skipped,
            self.total_nodes
        )
    }

    fn max_possible_successes(&self) -> usize {
        self.total_nodes - self.failures.len() - self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fail_fast_aborts_on_first_failure() {
        let mut state = StrategyState::new(ErrorStrategy::FailFast, 3);
        state.on_node_success();
        let decision = state.on_node_failure(NodeId::v4(), "boom");
        assert!(matches!(decision, StrategyDecision::Abort(_)));
        assert!(state.finalize().is_err());
    }

    #[test]
    fn fail_fast_passes_clean_run() {
        let mut state = StrategyState::new(ErrorStrategy::FailFast, 2);
        state.on_node_success();
        state.on_node_success();
        assert!(state.finalize().is_ok());
    }

    #[test]
    fn continue_on_error_collects_and_passes() {
        let mut state = StrategyState::new(ErrorStrategy::ContinueOnError, 3);
        assert_eq!(
            state.on_node_failure(NodeId::v4(), "a"),
            StrategyDecision::Continue
        );
        assert_eq!(
            state.on_node_failure(NodeId::v4(), "b"),
            StrategyDecision::Continue
        );
        state.on_node_success();
        assert!(state.finalize().is_ok());
        assert_eq!(state.failures().len(), 2);
    }

    #[test]
    fn best_effort_summarizes() {
        let mut state = StrategyState::new(ErrorStrategy::BestEffort, 4);
        state.on_node_success();
        state.on_node_success();
        state.on_node_failure(NodeId::v4(), "x");
        state.on_node_skipped();
        assert!(state.finalize().is_ok());
        assert_eq!(state.summary(), "2 succeeded, 1 failed, 1 skipped of 4 nodes");
    }

    #[test]
    fn require_n_aborts_when_unreachable() {
        // 3 nodes, need 3 successes: the first failure makes it impossible.
        let mut state = StrategyState::new(ErrorStrategy::RequireN { min_successes: 3 }, 3);
        let decision = state.on_node_failure(NodeId::v4(), "gone");
        assert!(matches!(decision, StrategyDecision::Abort(_)));
    }

    #[test]
    fn require_n_tolerates_failures_with_slack() {
        // 4 nodes, need 2: one failure and one skip still leave 2 possible.
        let mut state = StrategyState::new(ErrorStrategy::RequireN { min_successes: 2 }, 4);
        assert_eq!(
            state.on_node_failure(NodeId::v4(), "x"),
            StrategyDecision::Continue
        );
        state.on_node_skipped();
        state.on_node_success();
        state.on_node_success();
        assert!(state.finalize().is_ok());
    }

    #[test]
    fn require_n_fails_finalize_when_short() {
        let mut state = StrategyState::new(ErrorStrategy::RequireN { min_successes: 2 }, 2);
        state.on_node_success();
        // Remaining node neither failed nor succeeded (e.g. skipped late);
        // finalize still insists on the count.
        let err = state.finalize().unwrap_err();
        assert!(err.contains("required 2 successes, got 1"));
    }

    #[test]
    fn strategy_serde() {
        let json = serde_json::to_string(&ErrorStrategy::RequireN { min_successes: 2 }).unwrap();
        let back: ErrorStrategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ErrorStrategy::RequireN { min_successes: 2 });

        let fail_fast: ErrorStrategy =
            serde_json::from_str(r#"{"strategy":"fail_fast"}"#).unwrap();
        assert_eq!(fail_fast, ErrorStrategy::FailFast);
    }
}
