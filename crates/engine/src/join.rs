//! Join synchronization: branch tracking, firing decisions, input merging.

use std::collections::HashMap;

use cascade_core::{ExecutionId, NodeId};
use cascade_workflow::{JoinStrategy, MergeStrategy};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};

/// Tracks incoming-branch completion for every join node across executions.
///
/// Keys are `(execution, join node)` so concurrent executions never share
/// state. Firing is exactly-once: [`try_fire`](Self::try_fire) flips an
/// internal flag under the write lock.
#[derive(Debug, Default)]
pub struct JoinEvaluator {
    joins: RwLock<HashMap<(ExecutionId, NodeId), JoinState>>,
}

#[derive(Debug)]
struct JoinState {
    strategy: JoinStrategy,
    min_required: usize,
    merge: MergeStrategy,
    /// Branches still able to complete. Shrinks as branches fail or skip.
    active: Vec<NodeId>,
    /// Completed branch outputs in completion order.
    completed: Vec<(NodeId, Map<String, Value>)>,
    fired: bool,
    first_completion: Option<DateTime<Utc>>,
    last_completion: Option<DateTime<Utc>>,
}

impl JoinState {
    fn satisfied(&self) -> bool {
        match self.strategy {
            JoinStrategy::WaitAll => {
                !self.active.is_empty() && self.completed.len() == self.active.len()
            }
            JoinStrategy::WaitAny | JoinStrategy::WaitFirst => !self.completed.is_empty(),
            JoinStrategy::WaitN => self.completed.len() >= self.min_required,
        }
    }
}

impl JoinEvaluator {
    /// Create an empty evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a join node with its incoming branches and strategy.
    pub fn register(
        &self,
        execution_id: ExecutionId,
        join: NodeId,
        incoming: Vec<NodeId>,
        strategy: JoinStrategy,
        min_required: usize,
        merge: MergeStrategy,
    ) {
        self.joins.write().insert(
            (execution_id, join),
            JoinState {
                strategy,
                min_required,
                merge,
                active: incoming,
                completed: Vec::new(),
                fired: false,
                first_completion: None,
                last_completion: None,
            },
        );
    }

    /// Returns `true` if the join is registered for this execution.
    #[must_use]
    pub fn is_registered(&self, execution_id: ExecutionId, join: NodeId) -> bool {
        self.joins.read().contains_key(&(execution_id, join))
    }

    /// Record a branch completion. Duplicate completions are ignored.
    pub fn mark_branch_completed(
        &self,
        execution_id: ExecutionId,
        join: NodeId,
        branch: NodeId,
        output: Map<String, Value>,
    ) {
        let mut joins = self.joins.write();
        let Some(state) = joins.get_mut(&(execution_id, join)) else {
            return;
        };
        if !state.active.contains(&branch)
            || state.completed.iter().any(|(id, _)| *id == branch)
        {
            return;
        }
        let now = Utc::now();
        state.first_completion.get_or_insert(now);
        state.last_completion = Some(now);
        state.completed.push((branch, output));
    }

    /// Record that a branch can no longer complete (failed or skipped).
    pub fn mark_branch_inactive(&self, execution_id: ExecutionId, join: NodeId, branch: NodeId) {
        let mut joins = self.joins.write();
        if let Some(state) = joins.get_mut(&(execution_id, join)) {
            if !state.completed.iter().any(|(id, _)| *id == branch) {
                state.active.retain(|&id| id != branch);
            }
        }
    }

    /// Returns `true` once the recorded completions satisfy the strategy and
    /// the join has not fired yet.
    #[must_use]
    pub fn should_trigger(&self, execution_id: ExecutionId, join: NodeId) -> bool {
        self.joins
            .read()
            .get(&(execution_id, join))
            .is_some_and(|state| !state.fired && state.satisfied())
    }

    /// Atomically claim the (single) firing of a join. Returns `true` for
    /// exactly one caller.
    pub fn try_fire(&self, execution_id: ExecutionId, join: NodeId) -> bool {
        let mut joins = self.joins.write();
        let Some(state) = joins.get_mut(&(execution_id, join)) else {
            return false;
        };
        if state.fired || !state.satisfied() {
            return false;
        }
        state.fired = true;
        true
    }

    /// Merge the completed branch outputs into the join node's input map.
    ///
    /// Always carries `_join_branch_count`, `_join_strategy`,
    /// `_join_first_completion`, and `_join_last_completion`; `collect_all`
    /// additionally provides the raw outputs as `_join_branches`.
    #[must_use]
    pub fn join_input(&self, execution_id: ExecutionId, join: NodeId) -> Map<String, Value> {
        let joins = self.joins.read();
        let Some(state) = joins.get(&(execution_id, join)) else {
            return Map::new();
        };

        let mut input = Map::new();
        match state.merge {
            MergeStrategy::LastWins => {
                for (_, output) in &state.completed {
                    for (key, value) in output {
                        input.insert(key.clone(), value.clone());
                    }
                }
            }
            MergeStrategy::FirstOnly => {
                if let Some((_, output)) = state.completed.first() {
                    for (key, value) in output {
                        input.insert(key.clone(), value.clone());
                    }
                }
            }
            MergeStrategy::CollectAll => {
                input.insert(
                    "_join_branches".into(),
                    Value::Array(
                        state
                            .completed
                            .iter()
                            .map(|(_, output)| Value::Object(output.clone()))
                            .collect(),
                    ),
                );
            }
        }

        input.insert(
            "_join_branch_count".into(),
            Value::from(state.completed.len() as u64),
        );
        input.insert(
            "_join_strategy".into(),
            Value::String(state.strategy.as_tag().to_string()),
        );
        if let Some(first) = state.first_completion {
            input.insert(
                "_join_first_completion".into(),
                Value::String(first.to_rfc3339()),
            );
        }
        if let Some(last) = state.last_completion {
            input.insert(
                "_join_last_completion".into(),
                Value::String(last.to_rfc3339()),
            );
        }
        input
    }

    /// Drop all join state belonging to one execution.
    pub fn clear_execution(&self, execution_id: ExecutionId) {
        self.joins
            .write()
            .retain(|(execution, _), _| *execution != execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    struct Setup {
        joins: JoinEvaluator,
        execution: ExecutionId,
        join: NodeId,
        branches: [NodeId; 3],
    }

    fn setup(strategy: JoinStrategy, min_required: usize, merge: MergeStrategy) -> Setup {
        let joins = JoinEvaluator::new();
        let execution = ExecutionId::v4();
        let join = NodeId::v4();
        let branches = [NodeId::v4(), NodeId::v4(), NodeId::v4()];
        joins.register(
            execution,
            join,
            branches.to_vec(),
            strategy,
            min_required,
            merge,
        );
        Setup {
            joins,
            execution,
            join,
            branches,
        }
    }

    #[test]
    fn wait_all_fires_only_after_every_branch() {
        let s = setup(JoinStrategy::WaitAll, 1, MergeStrategy::LastWins);
        for (i, &branch) in s.branches.iter().enumerate() {
            assert!(!s.joins.should_trigger(s.execution, s.join), "fired after {i} branches");
            s.joins
                .mark_branch_completed(s.execution, s.join, branch, Map::new());
        }
        assert!(s.joins.should_trigger(s.execution, s.join));
    }

    #[test]
    fn wait_any_fires_on_first_completion() {
        let s = setup(JoinStrategy::WaitAny, 1, MergeStrategy::LastWins);
        assert!(!s.joins.should_trigger(s.execution, s.join));
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());
        assert!(s.joins.should_trigger(s.execution, s.join));
    }

    #[test]
    fn wait_n_fires_on_nth_completion() {
        let s = setup(JoinStrategy::WaitN, 2, MergeStrategy::LastWins);
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());
        assert!(!s.joins.should_trigger(s.execution, s.join));
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[1], Map::new());
        assert!(s.joins.should_trigger(s.execution, s.join));
    }

    #[test]
    fn firing_is_exactly_once() {
        let s = setup(JoinStrategy::WaitAny, 1, MergeStrategy::LastWins);
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());

        assert!(s.joins.try_fire(s.execution, s.join));
        assert!(!s.joins.try_fire(s.execution, s.join));
        assert!(!s.joins.should_trigger(s.execution, s.join));
        // A later completion never re-triggers.
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[1], Map::new());
        assert!(!s.joins.try_fire(s.execution, s.join));
    }

    #[test]
    fn inactive_branches_shrink_wait_all() {
        let s = setup(JoinStrategy::WaitAll, 1, MergeStrategy::LastWins);
        s.joins
            .mark_branch_inactive(s.execution, s.join, s.branches[2]);
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[1], Map::new());
        assert!(s.joins.should_trigger(s.execution, s.join));
    }

    #[test]
    fn last_wins_merges_in_completion_order() {
        let s = setup(JoinStrategy::WaitAll, 1, MergeStrategy::LastWins);
        s.joins.mark_branch_completed(
            s.execution,
            s.join,
            s.branches[0],
            obj(&[("k", json!("first")), ("a", json!(1))]),
        );
        s.joins.mark_branch_completed(
            s.execution,
            s.join,
            s.branches[1],
            obj(&[("k", json!("second"))]),
        );
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[2], Map::new());

        let input = s.joins.join_input(s.execution, s.join);
        assert_eq!(input["k"], json!("second"));
        assert_eq!(input["a"], json!(1));
        assert_eq!(input["_join_branch_count"], json!(3));
        assert_eq!(input["_join_strategy"], json!("WAIT_ALL"));
        assert!(input.contains_key("_join_first_completion"));
        assert!(input.contains_key("_join_last_completion"));
    }

    #[test]
    fn first_only_keeps_first_branch() {
        let s = setup(JoinStrategy::WaitAny, 1, MergeStrategy::FirstOnly);
        s.joins.mark_branch_completed(
            s.execution,
            s.join,
            s.branches[1],
            obj(&[("k", json!("winner"))]),
        );
        s.joins.mark_branch_completed(
            s.execution,
            s.join,
            s.branches[0],
            obj(&[("k", json!("late"))]),
        );
        let input = s.joins.join_input(s.execution, s.join);
        assert_eq!(input["k"], json!("winner"));
    }

    #[test]
    fn collect_all_provides_branch_list() {
        let s = setup(JoinStrategy::WaitAll, 1, MergeStrategy::CollectAll);
        for (i, &branch) in s.branches.iter().enumerate() {
            s.joins.mark_branch_completed(
                s.execution,
                s.join,
                branch,
                obj(&[("i", json!(i))]),
            );
        }
        let input = s.joins.join_input(s.execution, s.join);
        let branches = input["_join_branches"].as_array().unwrap();
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0]["i"], json!(0));
        // Raw keys are not merged top-level under collect_all.
        assert!(!input.contains_key("i"));
    }

    #[test]
    fn duplicate_completions_are_ignored() {
        let s = setup(JoinStrategy::WaitN, 2, MergeStrategy::LastWins);
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());
        assert!(!s.joins.should_trigger(s.execution, s.join));
    }

    #[test]
    fn executions_are_isolated() {
        let s = setup(JoinStrategy::WaitAny, 1, MergeStrategy::LastWins);
        let other_execution = ExecutionId::v4();
        s.joins.register(
            other_execution,
            s.join,
            s.branches.to_vec(),
            JoinStrategy::WaitAny,
            1,
            MergeStrategy::LastWins,
        );
        s.joins
            .mark_branch_completed(s.execution, s.join, s.branches[0], Map::new());

        assert!(s.joins.should_trigger(s.execution, s.join));
        assert!(!s.joins.should_trigger(other_execution, s.join));

        s.joins.clear_execution(s.execution);
        assert!(!s.joins.is_registered(s.execution, s.join));
        assert!(s.joins.is_registered(other_execution, s.join));
    }
}
