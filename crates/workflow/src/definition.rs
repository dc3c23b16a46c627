//! The workflow definition aggregate.

use cascade_core::{NodeId, WorkflowId};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::edge::EdgeDefinition;
use crate::error::WorkflowError;
use crate::graph::DependencyGraph;
use crate::node::NodeDefinition;
use crate::state::WorkflowState;
use crate::trigger::TriggerDefinition;

/// An immutable, versioned workflow definition.
///
/// Owns its nodes, edges, and triggers. Once `Published`, a version is
/// frozen; changes mean a new version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Definition version.
    pub version: Version,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle state.
    #[serde(default = "default_state")]
    pub state: WorkflowState,
    /// The workflow's nodes.
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    /// The workflow's edges.
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// The workflow's triggers.
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
    /// Free-form spec metadata.
    #[serde(default)]
    pub spec: serde_json::Map<String, Value>,
    /// When this definition was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// When this definition was last updated.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_state() -> WorkflowState {
    WorkflowState::Draft
}

impl WorkflowDefinition {
    /// Create an empty draft workflow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::v4(),
            name: name.into(),
            version: Version::new(0, 1, 0),
            description: None,
            state: WorkflowState::Draft,
            nodes: Vec::new(),
            edges: Vec::new(),
            triggers: Vec::new(),
            spec: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the node set.
    #[must_use]
    pub fn with_nodes(mut self, nodes: Vec<NodeDefinition>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Replace the edge set.
    #[must_use]
    pub fn with_edges(mut self, edges: Vec<EdgeDefinition>) -> Self {
        self.edges = edges;
        self
    }

    /// Replace the trigger set.
    #[must_use]
    pub fn with_triggers(mut self, triggers: Vec<TriggerDefinition>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Look up a node by ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Look up a node by its unique name.
    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Parse a definition from its JSON wire shape.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build and fully validate this definition's dependency graph.
    pub fn build_graph(&self) -> Result<DependencyGraph, WorkflowError> {
        let graph = DependencyGraph::from_definition(self)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Structural validation: referential integrity plus graph rules.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        self.build_graph().map(|_| ())
    }

    /// Validation required before an execution may start: structure, at
    /// least one trigger, and a `Published` state.
    pub fn validate_for_execution(&self) -> Result<(), WorkflowError> {
        self.validate()?;
        if self.triggers.is_empty() {
            return Err(WorkflowError::Validation(
                "workflow has no triggers".into(),
            ));
        }
        if !self.state.is_executable() {
            return Err(WorkflowError::Validation(format!(
                "workflow in state {} cannot be executed",
                self.state
            )));
        }
        Ok(())
    }

    /// Publish a draft, freezing it for execution. Validates structure first.
    pub fn publish(&mut self) -> Result<(), WorkflowError> {
        if !self.state.can_transition_to(WorkflowState::Published) {
            return Err(WorkflowError::InvalidStateTransition {
                from: self.state.to_string(),
                to: WorkflowState::Published.to_string(),
            });
        }
        self.validate()?;
        self.state = WorkflowState::Published;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Archive a published workflow.
    pub fn archive(&mut self) -> Result<(), WorkflowError> {
        if !self.state.can_transition_to(WorkflowState::Archived) {
            return Err(WorkflowError::InvalidStateTransition {
                from: self.state.to_string(),
                to: WorkflowState::Archived.to_string(),
            });
        }
        self.state = WorkflowState::Archived;
        self.updated_at = Utc::now();
        Ok(())
    }
}
