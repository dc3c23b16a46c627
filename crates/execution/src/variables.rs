//! Ordered variable sets with read-only marking.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExecutionError;

/// An ordered `name → value` mapping.
///
/// Insertion order is preserved (it determines merge and iteration order).
/// A set can be marked read-only — global context is — after which every
/// mutation fails instead of silently copy-on-writing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableSet {
    values: IndexMap<String, Value>,
    #[serde(default)]
    read_only: bool,
}

impl VariableSet {
    /// Create an empty, writable set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from a JSON object map, preserving its order.
    #[must_use]
    pub fn from_map(map: serde_json::Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
            read_only: false,
        }
    }

    /// Mark this set read-only.
    #[must_use]
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Returns `true` if mutations are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns `true` if the variable exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Set a variable. Fails on read-only sets.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Result<(), ExecutionError> {
        if self.read_only {
            return Err(ExecutionError::ReadOnlyVariables);
        }
        self.values.insert(name.into(), value);
        Ok(())
    }

    /// Merge another set in; its entries overwrite existing keys. Fails on
    /// read-only sets.
    pub fn merge(&mut self, other: &VariableSet) -> Result<(), ExecutionError> {
        if self.read_only {
            return Err(ExecutionError::ReadOnlyVariables);
        }
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the set holds no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// A writable clone (read-only flag cleared).
    #[must_use]
    pub fn writable_clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            read_only: false,
        }
    }

    /// Snapshot as a JSON object map.
    #[must_use]
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl From<serde_json::Map<String, Value>> for VariableSet {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self::from_map(map)
    }
}
