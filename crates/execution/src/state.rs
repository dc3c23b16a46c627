//! The event-sourced execution aggregate.
//!
//! Every mutator builds an [`ExecutionEvent`], routes it through
//! [`ExecutionState::apply_event`] — the single reducer shared with replay —
//! and buffers it for the next flush to the event store. Live state and
//! replayed state therefore cannot diverge.

use std::collections::HashMap;

use cascade_core::{ExecutionId, NodeId, TriggerId, WorkflowId};
use cascade_workflow::NodeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutionError;
use crate::event::{EventKind, ExecutionEvent};
use crate::phase::ExecutionPhase;
use crate::transition::{validate_execution_transition, validate_node_transition};
use crate::variables::VariableSet;

/// The execution state of a single node within a running workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionState {
    /// Current state of the node.
    pub state: NodeState,
    /// The current (1-based) attempt number; 0 before the first attempt.
    pub attempt: u32,
    /// The attempt cap in force for this node.
    pub max_attempts: u32,
    /// When this node started its first attempt.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When this node reached a terminal state.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// The recorded output, if the node completed.
    #[serde(default)]
    pub output: Option<Map<String, Value>>,
    /// Error message if the node failed.
    #[serde(default)]
    pub error: Option<String>,
}

impl NodeExecutionState {
    /// Create a new node execution state in the Pending state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: NodeState::Pending,
            attempt: 0,
            max_attempts: 1,
            started_at: None,
            finished_at: None,
            output: None,
            error: None,
        }
    }
}

impl Default for NodeExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// The complete, event-sourced state of a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Unique identifier for this execution.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The trigger that started the execution; set by `ExecutionStarted`.
    #[serde(default)]
    pub trigger_id: Option<TriggerId>,
    /// Current phase.
    pub phase: ExecutionPhase,
    /// When the execution started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal phase.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message for failed or cancelled executions.
    #[serde(default)]
    pub error: Option<String>,
    /// Read-only global context seeded at start.
    pub globals: VariableSet,
    /// Per-node execution states.
    pub node_states: HashMap<NodeId, NodeExecutionState>,
    /// Per-node output maps, keyed by node ID.
    pub node_outputs: HashMap<NodeId, Map<String, Value>>,
    /// Execution variables: each completed node's output under its name,
    /// which is what downstream parent-name namespacing binds against.
    pub variables: VariableSet,
    /// Events applied but not yet flushed to the store.
    #[serde(skip)]
    uncommitted: Vec<ExecutionEvent>,
    /// Metadata stamped onto every subsequently emitted event (engine
    /// version, wave index). Ignored by the reducer.
    #[serde(skip)]
    event_metadata: Map<String, Value>,
    /// Last assigned sequence number (0 before the first event).
    sequence: u64,
    /// Highest sequence known to be durable in the store.
    committed_sequence: u64,
}

impl ExecutionState {
    /// Create a fresh aggregate in `Pending` with no events.
    #[must_use]
    pub fn new(execution_id: ExecutionId, workflow_id: WorkflowId) -> Self {
        Self {
            execution_id,
            workflow_id,
            trigger_id: None,
            phase: ExecutionPhase::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            globals: VariableSet::new(),
            node_states: HashMap::new(),
            node_outputs: HashMap::new(),
            variables: VariableSet::new(),
            uncommitted: Vec::new(),
            event_metadata: Map::new(),
            sequence: 0,
            committed_sequence: 0,
        }
    }

    /// Rebuild an aggregate by replaying an ordered event log.
    pub fn from_events(events: &[ExecutionEvent]) -> Result<Self, ExecutionError> {
        let first = events.first().ok_or_else(|| {
            ExecutionError::PlanValidation("cannot replay an empty event log".into())
        })?;
        let mut state = Self::new(first.execution_id, first.workflow_id);
        for event in events {
            state.apply_event(event)?;
        }
        // Replayed events are already durable.
        state.committed_sequence = state.sequence;
        Ok(state)
    }

    // ── Reducer ─────────────────────────────────────────────────────

    /// Apply one event to in-memory state.
    ///
    /// This is the only code path that mutates execution-visible state,
    /// for both live mutation and replay. Events must arrive in contiguous
    /// sequence order.
    pub fn apply_event(&mut self, event: &ExecutionEvent) -> Result<(), ExecutionError> {
        if event.execution_id != self.execution_id {
            return Err(ExecutionError::WrongExecution {
                expected: self.execution_id,
                got: event.execution_id,
            });
        }
        if event.sequence != self.sequence + 1 {
            return Err(ExecutionError::SequenceGap {
                expected: self.sequence + 1,
                got: event.sequence,
            });
        }

        match &event.kind {
            EventKind::ExecutionStarted {
                trigger_id,
                node_ids,
                variables,
            } => {
                validate_execution_transition(self.phase, ExecutionPhase::Executing)?;
                self.phase = ExecutionPhase::Executing;
                self.trigger_id = Some(*trigger_id);
                self.started_at = Some(event.timestamp);
                self.globals = VariableSet::from_map(variables.clone()).into_read_only();
                for &node_id in node_ids {
                    self.node_states
                        .entry(node_id)
                        .or_insert_with(NodeExecutionState::new);
                }
            }

            EventKind::NodeStarted {
                node_id,
                attempt,
                max_attempts,
                ..
            } => {
                let node = self.node_state_mut(*node_id)?;
                validate_node_transition(node.state, NodeState::Running)?;
                node.state = NodeState::Running;
                node.attempt = *attempt;
                node.max_attempts = *max_attempts;
                node.started_at = Some(event.timestamp);
            }

            EventKind::NodeRetrying { node_id, attempt, .. } => {
                let node = self.node_state_mut(*node_id)?;
                validate_node_transition(node.state, NodeState::Retrying)?;
                node.state = NodeState::Retrying;
                node.attempt = *attempt;
            }

            EventKind::NodeCompleted {
                node_id,
                node_name,
                output,
                ..
            } => {
                let node = self.node_state_mut(*node_id)?;
                validate_node_transition(node.state, NodeState::Completed)?;
                node.state = NodeState::Completed;
                node.finished_at = Some(event.timestamp);
                node.output = Some(output.clone());
                self.node_outputs.insert(*node_id, output.clone());
                self.variables
                    .set(node_name.clone(), Value::Object(output.clone()))?;
            }

            EventKind::NodeFailed {
                node_id,
                error,
                attempt,
                ..
            } => {
                let node = self.node_state_mut(*node_id)?;
                validate_node_transition(node.state, NodeState::Failed)?;
                node.state = NodeState::Failed;
                node.attempt = *attempt;
                node.finished_at = Some(event.timestamp);
                node.error = Some(error.clone());
            }

            EventKind::NodeSkipped { node_id, reason, .. } => {
                let node = self.node_state_mut(*node_id)?;
                validate_node_transition(node.state, NodeState::Skipped)?;
                node.state = NodeState::Skipped;
                node.finished_at = Some(event.timestamp);
                node.error = Some(reason.clone());
            }

            EventKind::ExecutionCompleted { .. } => {
                validate_execution_transition(self.phase, ExecutionPhase::Completed)?;
                self.phase = ExecutionPhase::Completed;
                self.finished_at = Some(event.timestamp);
            }

            EventKind::ExecutionFailed { error } => {
                validate_execution_transition(self.phase, ExecutionPhase::Failed)?;
                self.phase = ExecutionPhase::Failed;
                self.finished_at = Some(event.timestamp);
                self.error = Some(error.clone());
            }

            EventKind::ExecutionCancelled { reason } => {
                validate_execution_transition(self.phase, ExecutionPhase::Cancelled)?;
                self.phase = ExecutionPhase::Cancelled;
                self.finished_at = Some(event.timestamp);
                self.error = Some(reason.clone());
            }
        }

        self.sequence = event.sequence;
        Ok(())
    }

    // ── Mutators (emit + apply + buffer) ────────────────────────────

    /// Record the execution start. Seeds node states and freezes globals.
    pub fn record_started(
        &mut self,
        trigger_id: TriggerId,
        node_ids: Vec<NodeId>,
        variables: Map<String, Value>,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::ExecutionStarted {
            trigger_id,
            node_ids,
            variables,
        })
    }

    /// Record a node's first attempt starting.
    pub fn record_node_started(
        &mut self,
        node_id: NodeId,
        node_name: impl Into<String>,
        max_attempts: u32,
        inputs: Map<String, Value>,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::NodeStarted {
            node_id,
            node_name: node_name.into(),
            attempt: 1,
            max_attempts,
            inputs,
        })
    }

    /// Record an upcoming retry attempt.
    pub fn record_node_retrying(
        &mut self,
        node_id: NodeId,
        node_name: impl Into<String>,
        attempt: u32,
        delay_ms: u64,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::NodeRetrying {
            node_id,
            node_name: node_name.into(),
            attempt,
            delay_ms,
        })
    }

    /// Record a node success with its (schema-filtered) output.
    pub fn record_node_completed(
        &mut self,
        node_id: NodeId,
        node_name: impl Into<String>,
        output: Map<String, Value>,
        duration_ms: Option<u64>,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::NodeCompleted {
            node_id,
            node_name: node_name.into(),
            output,
            duration_ms,
        })
    }

    /// Record a node's terminal failure.
    pub fn record_node_failed(
        &mut self,
        node_id: NodeId,
        node_name: impl Into<String>,
        error: impl Into<String>,
        attempt: u32,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::NodeFailed {
            node_id,
            node_name: node_name.into(),
            error: error.into(),
            attempt,
        })
    }

    /// Record a node being skipped.
    pub fn record_node_skipped(
        &mut self,
        node_id: NodeId,
        node_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::NodeSkipped {
            node_id,
            node_name: node_name.into(),
            reason: reason.into(),
        })
    }

    /// Record successful completion of the whole execution.
    pub fn record_completed(&mut self) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::ExecutionCompleted {
            variables: self.variables.to_map(),
        })
    }

    /// Record execution failure.
    pub fn record_failed(
        &mut self,
        error: impl Into<String>,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::ExecutionFailed { error: error.into() })
    }

    /// Record execution cancellation.
    pub fn record_cancelled(
        &mut self,
        reason: impl Into<String>,
    ) -> Result<ExecutionEvent, ExecutionError> {
        self.emit(EventKind::ExecutionCancelled {
            reason: reason.into(),
        })
    }

    fn emit(&mut self, kind: EventKind) -> Result<ExecutionEvent, ExecutionError> {
        let mut event = ExecutionEvent::new(
            self.execution_id,
            self.workflow_id,
            self.sequence + 1,
            kind,
        );
        event.metadata = self.event_metadata.clone();
        self.apply_event(&event)?;
        self.uncommitted.push(event.clone());
        Ok(event)
    }

    /// Set the metadata map stamped onto every subsequently emitted event.
    pub fn set_event_metadata(&mut self, metadata: Map<String, Value>) {
        self.event_metadata = metadata;
    }

    // ── Transient phase moves (no event; replay skips these) ────────

    /// Enter `Planning`.
    pub fn begin_planning(&mut self) -> Result<(), ExecutionError> {
        validate_execution_transition(self.phase, ExecutionPhase::Planning)?;
        self.phase = ExecutionPhase::Planning;
        Ok(())
    }

    /// Enter `Finalizing`.
    pub fn begin_finalizing(&mut self) -> Result<(), ExecutionError> {
        validate_execution_transition(self.phase, ExecutionPhase::Finalizing)?;
        self.phase = ExecutionPhase::Finalizing;
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Get a node's execution state.
    #[must_use]
    pub fn node_state(&self, node_id: NodeId) -> Option<&NodeExecutionState> {
        self.node_states.get(&node_id)
    }

    /// Get a node's recorded output.
    #[must_use]
    pub fn node_output(&self, node_id: NodeId) -> Option<&Map<String, Value>> {
        self.node_outputs.get(&node_id)
    }

    /// Returns `true` if all nodes are in terminal states.
    #[must_use]
    pub fn all_nodes_terminal(&self) -> bool {
        self.node_states.values().all(|n| n.state.is_terminal())
    }

    /// IDs of all completed nodes.
    #[must_use]
    pub fn completed_node_ids(&self) -> Vec<NodeId> {
        self.nodes_in_state(NodeState::Completed)
    }

    /// IDs of all failed nodes.
    #[must_use]
    pub fn failed_node_ids(&self) -> Vec<NodeId> {
        self.nodes_in_state(NodeState::Failed)
    }

    /// IDs of all skipped nodes.
    #[must_use]
    pub fn skipped_node_ids(&self) -> Vec<NodeId> {
        self.nodes_in_state(NodeState::Skipped)
    }

    fn nodes_in_state(&self, state: NodeState) -> Vec<NodeId> {
        self.node_states
            .iter()
            .filter(|(_, n)| n.state == state)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Last assigned sequence number.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.sequence
    }

    /// Highest sequence known to be durable.
    #[must_use]
    pub fn committed_sequence(&self) -> u64 {
        self.committed_sequence
    }

    /// Drain the uncommitted event buffer for flushing.
    pub fn take_uncommitted(&mut self) -> Vec<ExecutionEvent> {
        std::mem::take(&mut self.uncommitted)
    }

    /// Number of buffered events.
    #[must_use]
    pub fn uncommitted_len(&self) -> usize {
        self.uncommitted.len()
    }

    /// Mark everything up to `sequence` as durable.
    pub fn mark_committed(&mut self, sequence: u64) {
        self.committed_sequence = self.committed_sequence.max(sequence);
    }

    fn node_state_mut(
        &mut self,
        node_id: NodeId,
    ) -> Result<&mut NodeExecutionState, ExecutionError> {
        self.node_states
            .get_mut(&node_id)
            .ok_or(ExecutionError::NodeNotFound(node_id))
    }
}
