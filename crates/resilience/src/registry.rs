//! Keyed registry of circuit breakers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::breaker::{BreakerStats, CircuitBreaker, CircuitBreakerConfig};

/// Maps logical target keys (service name, node name) to their breakers.
///
/// Creation is race-free: the dashmap entry API gives the double-checked
/// pattern without an outer lock.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl BreakerRegistry {
    /// Create a registry whose breakers use `default_config`.
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Get the breaker for `key`, creating it on first use.
    #[must_use]
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.default_config.clone())))
            .clone()
    }

    /// Get the breaker for `key` if it already exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(key).map(|entry| entry.clone())
    }

    /// Number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns `true` if no breakers exist yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Copy-on-read statistics for every registered breaker.
    #[must_use]
    pub fn stats(&self) -> HashMap<String, BreakerStats> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    /// Reset a single breaker; no-op if it does not exist.
    pub fn reset(&self, key: &str) {
        if let Some(breaker) = self.get(key) {
            breaker.reset();
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
