//! Evaluation context: the variable environment expressions run against.

use serde_json::{Map, Value};

/// The variable environment for expression evaluation.
///
/// A flat map of top-level names to JSON values; nested data is reached
/// through property/index access in the expression itself (`fetch.body.id`)
/// or through dot-paths in template lookups (`{{fetch.body.id}}`).
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    variables: Map<String, Value>,
}

impl EvaluationContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from an existing variable map.
    #[must_use]
    pub fn from_map(variables: Map<String, Value>) -> Self {
        Self { variables }
    }

    /// Set a top-level variable.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Merge another map in; existing keys are overwritten.
    pub fn extend(&mut self, other: Map<String, Value>) {
        self.variables.extend(other);
    }

    /// Resolve a top-level variable.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Resolve a dot-separated path into the variable tree.
    ///
    /// Path segments traverse objects by key and arrays by numeric index.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.variables.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Number of top-level variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns `true` if the context has no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Borrow the underlying map.
    #[must_use]
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }
}
