//! In-memory store implementations for tests and embedders.

use std::collections::HashMap;

use async_trait::async_trait;
use cascade_core::{ExecutionId, WorkflowId};
use cascade_execution::{EventType, ExecutionEvent};
use cascade_workflow::WorkflowDefinition;
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::event_store::EventStore;
use crate::repository::WorkflowRepository;

/// In-memory [`EventStore`].
///
/// A single write lock makes batch appends atomic; contiguity is validated
/// for the whole batch before anything is inserted.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    logs: RwLock<HashMap<ExecutionId, Vec<ExecutionEvent>>>,
}

impl MemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of executions with at least one stored event.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.logs.read().len()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append_events(&self, events: Vec<ExecutionEvent>) -> Result<(), StorageError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut logs = self.logs.write();

        // Validate the full batch against current tails before mutating, so
        // a rejected batch leaves the store untouched.
        let mut expected: HashMap<ExecutionId, u64> = HashMap::new();
        for event in &events {
            let next = expected.entry(event.execution_id).or_insert_with(|| {
                logs.get(&event.execution_id)
                    .and_then(|log| log.last())
                    .map_or(1, |last| last.sequence + 1)
            });
            if event.sequence != *next {
                return Err(StorageError::SequenceConflict {
                    execution_id: event.execution_id,
                    expected: *next,
                    got: event.sequence,
                });
            }
            *next += 1;
        }

        for event in events {
            logs.entry(event.execution_id).or_default().push(event);
        }
        Ok(())
    }

    async fn get_events(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Vec<ExecutionEvent>, StorageError> {
        Ok(self
            .logs
            .read()
            .get(&execution_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_events_since(
        &self,
        execution_id: ExecutionId,
        after_sequence: u64,
    ) -> Result<Vec<ExecutionEvent>, StorageError> {
        Ok(self
            .get_events(execution_id)
            .await?
            .into_iter()
            .filter(|e| e.sequence > after_sequence)
            .collect())
    }

    async fn get_events_by_type(
        &self,
        execution_id: ExecutionId,
        event_type: EventType,
    ) -> Result<Vec<ExecutionEvent>, StorageError> {
        Ok(self
            .get_events(execution_id)
            .await?
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect())
    }

    async fn get_events_by_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<ExecutionEvent>, StorageError> {
        let logs = self.logs.read();
        let mut executions: Vec<(&ExecutionId, &Vec<ExecutionEvent>)> = logs
            .iter()
            .filter(|(_, log)| log.first().is_some_and(|e| e.workflow_id == workflow_id))
            .collect();
        // Stable output order across calls.
        executions.sort_by_key(|(id, _)| **id);
        Ok(executions
            .into_iter()
            .flat_map(|(_, log)| log.iter().cloned())
            .collect())
    }

    async fn get_event_count(&self, execution_id: ExecutionId) -> Result<u64, StorageError> {
        Ok(self
            .logs
            .read()
            .get(&execution_id)
            .map_or(0, |log| log.len() as u64))
    }
}

/// In-memory [`WorkflowRepository`].
#[derive(Debug, Default)]
pub struct MemoryWorkflowRepository {
    workflows: RwLock<HashMap<WorkflowId, WorkflowDefinition>>,
}

impl MemoryWorkflowRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn get(&self, workflow_id: WorkflowId) -> Result<WorkflowDefinition, StorageError> {
        self.workflows
            .read()
            .get(&workflow_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("workflow {workflow_id}")))
    }

    async fn save(&self, workflow: WorkflowDefinition) -> Result<(), StorageError> {
        self.workflows.write().insert(workflow.id, workflow);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowId>, StorageError> {
        let mut ids: Vec<WorkflowId> = self.workflows.read().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
