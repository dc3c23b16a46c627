//! Edge definitions: direct data flow and condition-guarded activation.

use cascade_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an edge activates its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeType {
    /// Always active once the source completes.
    #[default]
    Direct,
    /// Active only when its `condition` expression evaluates to true.
    Conditional,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// Unique identifier.
    pub id: EdgeId,
    /// Source node.
    #[serde(rename = "from")]
    pub from_node: NodeId,
    /// Target node.
    #[serde(rename = "to")]
    pub to_node: NodeId,
    /// Direct or conditional.
    #[serde(rename = "type", default)]
    pub edge_type: EdgeType,
    /// Edge configuration (`condition`, `include_outputs_from`).
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

impl EdgeDefinition {
    /// Create a direct edge with an empty config.
    #[must_use]
    pub fn direct(from: NodeId, to: NodeId) -> Self {
        Self {
            id: EdgeId::v4(),
            from_node: from,
            to_node: to,
            edge_type: EdgeType::Direct,
            config: serde_json::Map::new(),
        }
    }

    /// Create a conditional edge guarded by `condition`.
    #[must_use]
    pub fn conditional(from: NodeId, to: NodeId, condition: impl Into<String>) -> Self {
        let mut config = serde_json::Map::new();
        config.insert("condition".into(), Value::String(condition.into()));
        Self {
            id: EdgeId::v4(),
            from_node: from,
            to_node: to,
            edge_type: EdgeType::Conditional,
            config,
        }
    }

    /// Add ancestor node names whose outputs the target receives as
    /// additional data sources.
    #[must_use]
    pub fn with_include_outputs_from(mut self, names: &[&str]) -> Self {
        self.config.insert(
            "include_outputs_from".into(),
            Value::Array(names.iter().map(|n| Value::String((*n).into())).collect()),
        );
        self
    }

    /// Returns `true` for conditional edges.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.edge_type == EdgeType::Conditional
    }

    /// The guarding condition expression, if any.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.config.get("condition").and_then(Value::as_str)
    }

    /// Ancestor node names listed in `include_outputs_from`.
    #[must_use]
    pub fn include_outputs_from(&self) -> Vec<&str> {
        self.config
            .get("include_outputs_from")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_edge_has_no_condition() {
        let edge = EdgeDefinition::direct(NodeId::v4(), NodeId::v4());
        assert!(!edge.is_conditional());
        assert!(edge.condition().is_none());
        assert!(edge.include_outputs_from().is_empty());
    }

    #[test]
    fn conditional_edge_carries_condition() {
        let edge = EdgeDefinition::conditional(NodeId::v4(), NodeId::v4(), "score > 0.5");
        assert!(edge.is_conditional());
        assert_eq!(edge.condition(), Some("score > 0.5"));
    }

    #[test]
    fn include_outputs_from_names() {
        let edge = EdgeDefinition::direct(NodeId::v4(), NodeId::v4())
            .with_include_outputs_from(&["fetch", "parse"]);
        assert_eq!(edge.include_outputs_from(), vec!["fetch", "parse"]);
    }

    #[test]
    fn serde_uses_wire_field_names() {
        let edge = EdgeDefinition::conditional(NodeId::v4(), NodeId::v4(), "output.ok");
        let json = serde_json::to_value(&edge).unwrap();
        assert!(json.get("from").is_some());
        assert!(json.get("to").is_some());
        assert_eq!(json["type"], "Conditional");

        let back: EdgeDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back.from_node, edge.from_node);
        assert_eq!(back.condition(), Some("output.ok"));
    }

    #[test]
    fn edge_type_defaults_to_direct() {
        let json = serde_json::json!({
            "id": EdgeId::v4(),
            "from": NodeId::v4(),
            "to": NodeId::v4(),
        });
        let edge: EdgeDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(edge.edge_type, EdgeType::Direct);
    }
}
