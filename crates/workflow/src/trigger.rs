//! Trigger definitions: what is allowed to start an execution.

use std::collections::HashMap;
use std::time::Duration;

use cascade_core::TriggerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::VariableSpec;

/// The kind of event a trigger reacts to.
///
/// Scheduling itself (cron, webhook transport) is outside the engine; by the
/// time the engine sees a trigger it is already "ready".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerType {
    /// Explicit user action.
    Manual,
    /// Inbound webhook delivery.
    Webhook,
    /// Time-based schedule.
    Scheduled,
    /// Internal event bus.
    Event,
    /// Fires whenever upstream data changes.
    Auto,
}

/// A trigger attached to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// Unique identifier.
    pub id: TriggerId,
    /// The trigger's type tag.
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// Activation configuration (`enabled`, `cooldown_ms`, `max_concurrent`,
    /// `condition`, `input_schema`).
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

impl TriggerDefinition {
    /// Create a trigger with an empty config.
    #[must_use]
    pub fn new(id: TriggerId, trigger_type: TriggerType) -> Self {
        Self {
            id,
            trigger_type,
            config: serde_json::Map::new(),
        }
    }

    /// Create a manual trigger (the common case in tests and embeddings).
    #[must_use]
    pub fn manual() -> Self {
        Self::new(TriggerId::v4(), TriggerType::Manual)
    }

    /// Set a single config key.
    #[must_use]
    pub fn with_config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Whether this trigger is enabled (`enabled`, default true).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.config
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Minimum time between activations (`cooldown_ms`, default zero).
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.config
            .get("cooldown_ms")
            .and_then(Value::as_u64)
            .map_or(Duration::ZERO, Duration::from_millis)
    }

    /// Concurrent-execution cap (`max_concurrent`); `None` means unlimited.
    #[must_use]
    pub fn max_concurrent(&self) -> Option<u64> {
        match self.config.get("max_concurrent").and_then(Value::as_u64) {
            Some(0) | None => None,
            Some(n) => Some(n),
        }
    }

    /// Activation predicate expression (`condition`), if any.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.config.get("condition").and_then(Value::as_str)
    }

    /// Declared input schema (`input_schema`), if any.
    #[must_use]
    pub fn input_schema(&self) -> Option<HashMap<String, VariableSpec>> {
        self.config
            .get("input_schema")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}
