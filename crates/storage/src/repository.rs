//! The workflow repository contract.

use async_trait::async_trait;
use cascade_core::WorkflowId;
use cascade_workflow::WorkflowDefinition;

use crate::error::StorageError;

/// Lookup and persistence of workflow definitions.
///
/// Optional from the engine's point of view — embedders may hand the engine
/// a definition directly — but the contract is defined here so stores and
/// engines agree on it.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Fetch a definition by ID.
    async fn get(&self, workflow_id: WorkflowId) -> Result<WorkflowDefinition, StorageError>;

    /// Persist a definition, replacing any prior version under the same ID.
    async fn save(&self, workflow: WorkflowDefinition) -> Result<(), StorageError>;

    /// IDs of all stored definitions.
    async fn list(&self) -> Result<Vec<WorkflowId>, StorageError>;
}
