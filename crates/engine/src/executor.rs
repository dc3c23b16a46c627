//! The node executor contract and type-keyed registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::{ExecutionId, NodeId, WorkflowId};
use cascade_execution::VariableSet;
use cascade_workflow::{NodeDefinition, NodeType};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// The immutable input snapshot a node executor receives.
///
/// Executors MUST NOT mutate inputs (they receive a shared reference), MUST
/// honor the cancellation token, and MAY be invoked multiple times for one
/// node when retries are enabled — they are expected to be side-effect
/// aware.
#[derive(Debug, Clone)]
pub struct NodeExecutionInputs {
    /// Scoped variables built by the binder for this node only.
    pub variables: VariableSet,
    /// Read-only globals seeded at execution start.
    pub global_context: VariableSet,
    /// Raw parent outputs keyed by parent node ID.
    pub parent_outputs: HashMap<NodeId, Map<String, Value>>,
    /// The running execution.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
}

/// Executes nodes of one [`NodeType`].
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Run the node and produce its output map.
    async fn execute(
        &self,
        cancellation: &CancellationToken,
        node: &NodeDefinition,
        inputs: &NodeExecutionInputs,
    ) -> Result<Map<String, Value>, EngineError>;
}

/// Type-keyed executor registry.
///
/// Executors register at engine construction; the engine never depends on
/// concrete executor internals.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a node type, replacing any previous one.
    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type, executor);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(node_type, executor);
        self
    }

    /// Look up the executor for a node type.
    #[must_use]
    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&node_type).cloned()
    }

    /// All registered node types.
    #[must_use]
    pub fn registered_types(&self) -> Vec<NodeType> {
        self.executors.keys().copied().collect()
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("registered", &self.registered_types())
            .finish()
    }
}
