//! The append-only event store contract.

use async_trait::async_trait;
use cascade_core::{ExecutionId, WorkflowId};
use cascade_execution::{EventType, ExecutionEvent};

use crate::error::StorageError;

/// Append-only, per-execution ordered event log.
///
/// Implementations must guarantee:
///
/// - `append_events` is atomic: either the whole batch becomes durable or
///   none of it does.
/// - Within one execution, stored sequence numbers are strictly increasing
///   and contiguous starting at 1; a batch that would break contiguity is
///   rejected with [`StorageError::SequenceConflict`].
/// - Reads return events ordered by sequence.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically append a batch of events. Events must already bear valid
    /// per-execution sequence numbers.
    async fn append_events(&self, events: Vec<ExecutionEvent>) -> Result<(), StorageError>;

    /// All events of one execution, ordered by sequence.
    async fn get_events(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<ExecutionEvent>, StorageError>;

    /// Events of one execution with `sequence > after_sequence`.
    async fn get_events_since(
        &self,
        execution_id: ExecutionId,
        after_sequence: u64,
    ) -> Result<Vec<ExecutionEvent>, StorageError>;

    /// Events of one execution with the given type, ordered by sequence.
    async fn get_events_by_type(
        &self,
        execution_id: ExecutionId,
        event_type: EventType,
    ) -> Result<Vec<ExecutionEvent>, StorageError>;

    /// Events across all executions of one workflow, ordered by execution
    /// and sequence.
    async fn get_events_by_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionEvent>, StorageError>;

    /// Number of stored events for one execution.
    async fn get_event_count(&self, execution_id: ExecutionId) -> Result<u64, StorageError>;
}
