//! The sequenced execution event: the unit of the append-only log.

use cascade_core::{EventId, ExecutionId, NodeId, TriggerId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant-only view of an event, for filtered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Execution left `Pending`.
    ExecutionStarted,
    /// A node began its first attempt.
    NodeStarted,
    /// A node finished successfully.
    NodeCompleted,
    /// A node failed terminally.
    NodeFailed,
    /// A node was excluded by conditional gating.
    NodeSkipped,
    /// A node is about to make another attempt.
    NodeRetrying,
    /// The execution finished successfully.
    ExecutionCompleted,
    /// The execution failed.
    ExecutionFailed,
    /// The execution was cancelled.
    ExecutionCancelled,
}

/// Typed event payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// The execution was started.
    ExecutionStarted {
        /// The trigger that started it.
        trigger_id: TriggerId,
        /// All nodes scheduled for this execution.
        node_ids: Vec<NodeId>,
        /// Initial (global) variables.
        variables: Map<String, Value>,
    },

    /// A node started its first attempt.
    NodeStarted {
        /// The node that started.
        node_id: NodeId,
        /// Its definition name.
        node_name: String,
        /// Which attempt number (1-based).
        attempt: u32,
        /// The attempt cap in force for this node.
        max_attempts: u32,
        /// The bound input variables.
        inputs: Map<String, Value>,
    },

    /// A node completed successfully.
    NodeCompleted {
        /// The node that completed.
        node_id: NodeId,
        /// Its definition name.
        node_name: String,
        /// The output map, filtered to the declared schema if any.
        output: Map<String, Value>,
        /// Wall-clock duration of the successful attempt, in milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },

    /// A node failed terminally (retries, if any, are exhausted).
    NodeFailed {
        /// The node that failed.
        node_id: NodeId,
        /// Its definition name.
        node_name: String,
        /// Error message.
        error: String,
        /// The final attempt number.
        attempt: u32,
    },

    /// A node was skipped.
    NodeSkipped {
        /// The node that was skipped.
        node_id: NodeId,
        /// Its definition name.
        node_name: String,
        /// Reason for skipping.
        reason: String,
    },

    /// A node is being retried.
    NodeRetrying {
        /// The node being retried.
        node_id: NodeId,
        /// Its definition name.
        node_name: String,
        /// Which attempt is about to be made (1-based).
        attempt: u32,
        /// Backoff that preceded this attempt, in milliseconds.
        delay_ms: u64,
    },

    /// The execution completed successfully.
    ExecutionCompleted {
        /// Final execution variables (per-node outputs by node name).
        variables: Map<String, Value>,
    },

    /// The execution failed.
    ExecutionFailed {
        /// Error message.
        error: String,
    },

    /// The execution was cancelled.
    ExecutionCancelled {
        /// Reason for cancellation.
        reason: String,
    },
}

impl EventKind {
    /// The discriminant of this payload.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ExecutionStarted { .. } => EventType::ExecutionStarted,
            Self::NodeStarted { .. } => EventType::NodeStarted,
            Self::NodeCompleted { .. } => EventType::NodeCompleted,
            Self::NodeFailed { .. } => EventType::NodeFailed,
            Self::NodeSkipped { .. } => EventType::NodeSkipped,
            Self::NodeRetrying { .. } => EventType::NodeRetrying,
            Self::ExecutionCompleted { .. } => EventType::ExecutionCompleted,
            Self::ExecutionFailed { .. } => EventType::ExecutionFailed,
            Self::ExecutionCancelled { .. } => EventType::ExecutionCancelled,
        }
    }

    /// The node this payload concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeSkipped { node_id, .. }
            | Self::NodeRetrying { node_id, .. } => Some(*node_id),
            Self::ExecutionStarted { .. }
            | Self::ExecutionCompleted { .. }
            | Self::ExecutionFailed { .. }
            | Self::ExecutionCancelled { .. } => None,
        }
    }
}

/// A single entry of an execution's append-only event log.
///
/// Sequence numbers are per-execution, strictly increasing, contiguous,
/// and start at 1; they are assigned by the aggregate under its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Unique event identifier.
    pub event_id: EventId,
    /// The execution this event belongs to.
    pub execution_id: ExecutionId,
    /// The workflow the execution runs.
    pub workflow_id: WorkflowId,
    /// Per-execution sequence number.
    pub sequence: u64,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The typed payload.
    #[serde(flatten)]
    pub kind: EventKind,
    /// Schemaless metadata (engine version, wave index, …). Unknown keys
    /// are preserved and ignored by replay.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ExecutionEvent {
    /// Create a new event with a fresh ID and the current time.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        sequence: u64,
        kind: EventKind,
    ) -> Self {
        Self {
            event_id: EventId::v4(),
            execution_id,
            workflow_id,
            sequence,
            timestamp: Utc::now(),
            kind,
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The event's discriminant.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// The node this event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        self.kind.node_id()
    }

    /// Returns `true` for node-level events.
    #[must_use]
    pub fn is_node_event(&self) -> bool {
        self.node_id().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(kind: EventKind) -> ExecutionEvent {
        ExecutionEvent::new(ExecutionId::v4(), WorkflowId::v4(), 1, kind)
    }

    #[test]
    fn execution_started_is_execution_level() {
        let e = event(EventKind::ExecutionStarted {
            trigger_id: TriggerId::v4(),
            node_ids: vec![NodeId::v4()],
            variables: Map::new(),
        });
        assert_eq!(e.event_type(), EventType::ExecutionStarted);
        assert!(e.node_id().is_none());
        assert!(!e.is_node_event());
    }

    #[test]
    fn node_events_carry_node_id() {
        let nid = NodeId::v4();
        let e = event(EventKind::NodeStarted {
            node_id: nid,
            node_name: "fetch".into(),
            attempt: 1,
            max_attempts: 1,
            inputs: Map::new(),
        });
        assert_eq!(e.node_id(), Some(nid));
        assert!(e.is_node_event());
    }

    #[test]
    fn metadata_builder() {
        let e = event(EventKind::ExecutionFailed { error: "boom".into() })
            .with_metadata("wave", 2.into());
        assert_eq!(e.metadata["wave"], serde_json::json!(2));
    }

    #[test]
    fn serde_roundtrip_all_variants() {
        let nid = NodeId::v4();
        let kinds = vec![
            EventKind::ExecutionStarted {
                trigger_id: TriggerId::v4(),
                node_ids: vec![nid],
                variables: Map::new(),
            },
            EventKind::NodeStarted {
                node_id: nid,
                node_name: "n".into(),
                attempt: 1,
                max_attempts: 3,
                inputs: Map::new(),
            },
            EventKind::NodeCompleted {
                node_id: nid,
                node_name: "n".into(),
                output: Map::new(),
                duration_ms: Some(12),
            },
            EventKind::NodeFailed {
                node_id: nid,
                node_name: "n".into(),
                error: "err".into(),
                attempt: 3,
            },
            EventKind::NodeSkipped {
                node_id: nid,
                node_name: "n".into(),
                reason: "condition not met".into(),
            },
            EventKind::NodeRetrying {
                node_id: nid,
                node_name: "n".into(),
                attempt: 2,
                delay_ms: 10,
            },
            EventKind::ExecutionCompleted { variables: Map::new() },
            EventKind::ExecutionFailed { error: "fatal".into() },
            EventKind::ExecutionCancelled { reason: "shutdown".into() },
        ];

        for kind in kinds {
            let e = event(kind);
            let json = serde_json::to_string(&e).unwrap();
            let back: ExecutionEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back.event_type(), e.event_type());
            assert_eq!(back.node_id(), e.node_id());
            assert_eq!(back.sequence, e.sequence);
        }
    }

    #[test]
    fn serde_tag_is_snake_case() {
        let e = event(EventKind::ExecutionFailed { error: "x".into() });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event"], "execution_failed");
    }
}
