//! Engine configuration.

use std::time::Duration;

use cascade_expression::TemplateMode;
use serde::{Deserialize, Serialize};

use crate::strategy::ErrorStrategy;

/// Tunables for a [`WorkflowEngine`](crate::engine::WorkflowEngine) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrency bound within one wave.
    pub max_parallel_nodes: usize,
    /// When false, nodes in a wave run sequentially.
    pub enable_parallel: bool,
    /// Strategy applied when no per-execution strategy is given.
    pub default_error_strategy: ErrorStrategy,
    /// Master switch for per-node retries; nodes still opt in individually.
    pub enable_retry: bool,
    /// Attempt cap for nodes that opt into retries without their own cap.
    pub default_max_retries: u32,
    /// Initial backoff for retrying nodes.
    #[serde(with = "duration_millis")]
    pub default_retry_delay: Duration,
    /// Master switch for circuit breaking around node calls.
    pub enable_circuit_breaker: bool,
    /// Per-node call timeout.
    #[serde(with = "duration_millis")]
    pub node_execution_timeout: Duration,
    /// Wall-clock budget for a whole execution.
    #[serde(with = "duration_millis")]
    pub workflow_execution_timeout: Duration,
    /// Whether node configs are template-processed before execution.
    pub enable_templating: bool,
    /// Missing-variable policy used for config templating.
    pub default_template_mode: TemplateMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 8,
            enable_parallel: true,
            default_error_strategy: ErrorStrategy::FailFast,
            enable_retry: true,
            default_max_retries: 3,
            default_retry_delay: Duration::from_millis(100),
            enable_circuit_breaker: true,
            node_execution_timeout: Duration::from_secs(30),
            workflow_execution_timeout: Duration::from_secs(600),
            enable_templating: true,
            default_template_mode: TemplateMode::Lenient,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.max_parallel_nodes, 8);
        assert!(config.enable_parallel);
        assert!(config.enable_retry);
        assert!(config.enable_templating);
        assert_eq!(config.default_template_mode, TemplateMode::Lenient);
        assert!(matches!(config.default_error_strategy, ErrorStrategy::FailFast));
    }

    #[test]
    fn serde_roundtrip() {
        let config = EngineConfig {
            max_parallel_nodes: 2,
            default_retry_delay: Duration::from_millis(250),
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_parallel_nodes, 2);
        assert_eq!(back.default_retry_delay, Duration::from_millis(250));
    }
}
