//! Node definitions: type tags, IO schema, and input-binding configuration.

use cascade_core::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The kind of work a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Entry marker; passes trigger input through.
    Start,
    /// Exit marker; passes its inputs through.
    End,
    /// Outbound HTTP call.
    #[serde(rename = "HTTP")]
    Http,
    /// Large-language-model invocation.
    #[serde(rename = "LLM")]
    Llm,
    /// Expression-driven data transform.
    Transform,
    /// Routes to one of several conditional edges.
    ConditionalRoute,
    /// Merges several inputs into one map.
    DataMerger,
    /// Aggregates a list input into a summary.
    DataAggregator,
    /// Parses a string field as JSON.
    #[serde(rename = "JSONParser")]
    JsonParser,
    /// User-provided script.
    Script,
    /// Synchronization point for multiple branches.
    Join,
    /// Fan-out point for parallel branches.
    Fork,
    /// Invocation of a registered function.
    FunctionCall,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Start => "Start",
            Self::End => "End",
            Self::Http => "HTTP",
            Self::Llm => "LLM",
            Self::Transform => "Transform",
            Self::ConditionalRoute => "ConditionalRoute",
            Self::DataMerger => "DataMerger",
            Self::DataAggregator => "DataAggregator",
            Self::JsonParser => "JSONParser",
            Self::Script => "Script",
            Self::Join => "Join",
            Self::Fork => "Fork",
            Self::FunctionCall => "FunctionCall",
        };
        write!(f, "{tag}")
    }
}

/// How a join node decides it may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinStrategy {
    /// Every active incoming branch must complete.
    WaitAll,
    /// One completed branch is enough.
    WaitAny,
    /// Alias of `WaitAny`; kept as a distinct tag for config compatibility.
    WaitFirst,
    /// At least `min_required` branches must complete.
    WaitN,
}

impl JoinStrategy {
    /// Config tag for this strategy (`WAIT_ALL`, …).
    #[must_use]
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::WaitAll => "WAIT_ALL",
            Self::WaitAny => "WAIT_ANY",
            Self::WaitFirst => "WAIT_FIRST",
            Self::WaitN => "WAIT_N",
        }
    }
}

/// How a join node merges outputs from its completed branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Later branch completions overwrite earlier keys.
    #[default]
    LastWins,
    /// All branch outputs are provided as a `_join_branches` list.
    CollectAll,
    /// Only the first completed branch's output is used.
    FirstOnly,
}

/// Declaration of a single input or output variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Whether binding fails when the variable is absent.
    #[serde(default)]
    pub required: bool,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Declared inputs and outputs of a node.
///
/// The output side doubles as a filter: when present, an executor's result is
/// trimmed to the declared output keys before being recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IoSchema {
    /// Declared input variables.
    #[serde(default)]
    pub inputs: HashMap<String, VariableSpec>,
    /// Declared output variables.
    #[serde(default)]
    pub outputs: HashMap<String, VariableSpec>,
}

impl IoSchema {
    /// Names of inputs marked required.
    #[must_use]
    pub fn required_inputs(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Returns `true` if the schema declares any outputs.
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }
}

/// Strategy for merging same-keyed outputs from multiple parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionStrategy {
    /// Each parent's full output is namespaced under the parent's node name.
    #[default]
    NamespaceByParent,
    /// Values for the same key are gathered into a list (singletons unwrapped).
    Collect,
    /// Any key present in two or more parents fails binding.
    Error,
}

/// Input-binding configuration for a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBinding {
    /// Whether parent outputs are bound automatically.
    #[serde(default = "default_auto_bind")]
    pub auto_bind: bool,
    /// How to resolve key collisions between parents.
    #[serde(default)]
    pub collision_strategy: CollisionStrategy,
    /// Explicit mappings `target_key ← source_path` applied after auto-bind.
    ///
    /// A source path is either `field` (searched across all parents) or
    /// `parent_name.field`.
    #[serde(default)]
    pub mappings: IndexMap<String, String>,
}

fn default_auto_bind() -> bool {
    true
}

impl Default for InputBinding {
    fn default() -> Self {
        Self {
            auto_bind: true,
            collision_strategy: CollisionStrategy::default(),
            mappings: IndexMap::new(),
        }
    }
}

/// A single node in a workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier.
    pub id: NodeId,
    /// The node's type tag.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Name, unique within the workflow.
    pub name: String,
    /// Type-specific configuration.
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
    /// Declared inputs/outputs, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_schema: Option<IoSchema>,
    /// Input-binding configuration.
    #[serde(default)]
    pub input_binding: InputBinding,
}

impl NodeDefinition {
    /// Create a node with an empty config and default binding.
    #[must_use]
    pub fn new(id: NodeId, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id,
            node_type,
            name: name.into(),
            config: serde_json::Map::new(),
            io_schema: None,
            input_binding: InputBinding::default(),
        }
    }

    /// Replace the config map.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Set a single config key.
    #[must_use]
    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Attach an IO schema.
    #[must_use]
    pub fn with_io_schema(mut self, schema: IoSchema) -> Self {
        self.io_schema = Some(schema);
        self
    }

    /// Replace the input-binding configuration.
    #[must_use]
    pub fn with_input_binding(mut self, binding: InputBinding) -> Self {
        self.input_binding = binding;
        self
    }

    /// The join strategy read from config (`join_strategy`), default `WAIT_ALL`.
    #[must_use]
    pub fn join_strategy(&self) -> JoinStrategy {
        match self.config.get("join_strategy").and_then(Value::as_str) {
            Some("WAIT_ANY") => JoinStrategy::WaitAny,
            Some("WAIT_FIRST") => JoinStrategy::WaitFirst,
            Some("WAIT_N") => JoinStrategy::WaitN,
            _ => JoinStrategy::WaitAll,
        }
    }

    /// Minimum completed branches for `WAIT_N`, read from config
    /// (`min_required`), default 1.
    #[must_use]
    pub fn min_required(&self) -> usize {
        self.config
            .get("min_required")
            .and_then(Value::as_u64)
            .map_or(1, |n| n as usize)
    }

    /// The merge strategy read from config (`merge_strategy`), default
    /// `last_wins`.
    #[must_use]
    pub fn merge_strategy(&self) -> MergeStrategy {
        match self.config.get("merge_strategy").and_then(Value::as_str) {
            Some("collect_all") => MergeStrategy::CollectAll,
            Some("first_only") => MergeStrategy::FirstOnly,
            _ => MergeStrategy::LastWins,
        }
    }

    /// Whether this node opted into retries (`retry_enabled`), default false.
    #[must_use]
    pub fn retry_enabled(&self) -> bool {
        self.config
            .get("retry_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Per-node attempt cap override (`max_attempts`), if configured.
    #[must_use]
    pub fn max_attempts_override(&self) -> Option<u32> {
        self.config
            .get("max_attempts")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
    }
}
