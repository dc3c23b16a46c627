//! Expression and template error types.

use thiserror::Error;

/// Errors raised while compiling or evaluating expressions and templates.
#[derive(Debug, Clone, Error)]
pub enum ExpressionError {
    /// The expression source could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Evaluation failed at runtime.
    #[error("evaluation error: {0}")]
    Eval(String),

    /// A referenced variable is not present in the context.
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// A condition evaluated to a non-boolean value.
    #[error("condition did not evaluate to a boolean (got {actual})")]
    NotBoolean {
        /// Type name of the actual result.
        actual: &'static str,
    },

    /// Operand types do not fit the operator.
    #[error("type error: expected {expected}, got {actual}")]
    Type {
        /// What the operator needed.
        expected: &'static str,
        /// What it received.
        actual: &'static str,
    },

    /// Template substitution failed.
    #[error("template error: {0}")]
    Template(String),
}
