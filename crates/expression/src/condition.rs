//! Compiled boolean conditions for edge gating and trigger activation.

use serde_json::Value;

use crate::ast::Expr;
use crate::context::EvaluationContext;
use crate::error::ExpressionError;
use crate::eval::Evaluator;
use crate::parser::parse;
use crate::value_utils::value_type_name;

/// A compiled expression expected to produce a boolean.
///
/// Compile once, evaluate many times. The source string is trimmed before
/// compilation so incidental whitespace never changes behavior.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Compile a condition from source.
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let trimmed = source.trim();
        Ok(Self {
            source: trimmed.to_string(),
            expr: parse(trimmed)?,
        })
    }

    /// The trimmed source this condition was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to any value.
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<Value, ExpressionError> {
        Evaluator::new().eval(&self.expr, context)
    }

    /// Evaluate, requiring a boolean result.
    pub fn evaluate_bool(&self, context: &EvaluationContext) -> Result<bool, ExpressionError> {
        match self.evaluate(context)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::NotBoolean {
                actual: value_type_name(&other),
            }),
        }
    }
}

/// Compile and evaluate a boolean condition in one step.
pub fn evaluate_predicate(
    source: &str,
    context: &EvaluationContext,
) -> Result<bool, ExpressionError> {
    Condition::compile(source)?.evaluate_bool(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvaluationContext {
        let mut ctx = EvaluationContext::new();
        ctx.set("score", json!(0.7));
        ctx.set("output", json!({"ok": true}));
        ctx
    }

    #[test]
    fn compile_trims_source() {
        let condition = Condition::compile("  score > 0.5  ").unwrap();
        assert_eq!(condition.source(), "score > 0.5");
        assert!(condition.evaluate_bool(&ctx()).unwrap());
    }

    #[test]
    fn boolean_result() {
        assert!(evaluate_predicate("output.ok", &ctx()).unwrap());
        assert!(!evaluate_predicate("score <= 0.5", &ctx()).unwrap());
    }

    #[test]
    fn non_boolean_result_is_rejected() {
        let err = evaluate_predicate("score + 1", &ctx()).unwrap_err();
        assert!(matches!(err, ExpressionError::NotBoolean { actual: "number" }));
    }

    #[test]
    fn compilation_failure_surfaces() {
        assert!(matches!(
            Condition::compile("score >"),
            Err(ExpressionError::Parse(_))
        ));
    }

    #[test]
    fn runtime_failure_surfaces() {
        let err = evaluate_predicate("missing > 1", &ctx()).unwrap_err();
        assert!(matches!(err, ExpressionError::VariableNotFound(_)));
    }

    #[test]
    fn reusable_across_contexts() {
        let condition = Condition::compile("score > 0.5").unwrap();
        assert!(condition.evaluate_bool(&ctx()).unwrap());

        let mut low = EvaluationContext::new();
        low.set("score", json!(0.2));
        assert!(!condition.evaluate_bool(&low).unwrap());
    }
}
