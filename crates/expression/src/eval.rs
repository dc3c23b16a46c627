//! AST evaluation.

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::context::EvaluationContext;
use crate::error::ExpressionError;
use crate::value_utils::{to_boolean, value_type_name, values_equal};

/// Maximum recursion depth for expression evaluation.
const MAX_RECURSION_DEPTH: usize = 128;

/// Evaluator for expression ASTs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Create a new evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an expression in the given context.
    pub fn eval(
        &self,
        expr: &Expr,
        context: &EvaluationContext,
    ) -> Result<Value, ExpressionError> {
        self.eval_with_depth(expr, context, 0)
    }

    fn eval_with_depth(
        &self,
        expr: &Expr,
        context: &EvaluationContext,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(ExpressionError::Eval(format!(
                "maximum recursion depth ({MAX_RECURSION_DEPTH}) exceeded"
            )));
        }

        match expr {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Variable(name) => context
                .resolve(name)
                .cloned()
                .ok_or_else(|| ExpressionError::VariableNotFound(name.clone())),

            Expr::Property { object, name } => {
                let value = self.eval_with_depth(object, context, depth + 1)?;
                match value {
                    Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
                    other => Err(ExpressionError::Type {
                        expected: "object",
                        actual: value_type_name(&other),
                    }),
                }
            }

            Expr::Index { object, index } => {
                let container = self.eval_with_depth(object, context, depth + 1)?;
                let key = self.eval_with_depth(index, context, depth + 1)?;
                match (&container, &key) {
                    (Value::Array(items), Value::Number(n)) => {
                        let idx = n.as_u64().ok_or_else(|| ExpressionError::Eval(
                            "array index must be a non-negative integer".into(),
                        ))? as usize;
                        Ok(items.get(idx).cloned().unwrap_or(Value::Null))
                    }
                    (Value::Object(map), Value::String(name)) => {
                        Ok(map.get(name).cloned().unwrap_or(Value::Null))
                    }
                    _ => Err(ExpressionError::Type {
                        expected: "array[number] or object[string]",
                        actual: value_type_name(&container),
                    }),
                }
            }

            Expr::Unary { op, expr } => {
                let value = self.eval_with_depth(expr, context, depth + 1)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!to_boolean(&value))),
                    UnaryOp::Neg => match &value {
                        Value::Number(n) => {
                            if let Some(i) = n.as_i64() {
                                Ok(Value::Number((-i).into()))
                            } else if let Some(f) = n.as_f64() {
                                serde_json::Number::from_f64(-f)
                                    .map(Value::Number)
                                    .ok_or_else(|| ExpressionError::Eval("cannot negate".into()))
                            } else {
                                Err(ExpressionError::Eval("cannot negate number".into()))
                            }
                        }
                        other => Err(ExpressionError::Type {
                            expected: "number",
                            actual: value_type_name(other),
                        }),
                    },
                }
            }

            Expr::Binary { left, op, right } => {
                // Short-circuit logical operators before evaluating the rhs.
                match op {
                    BinaryOp::And => {
                        let lhs = self.eval_with_depth(left, context, depth + 1)?;
                        if !to_boolean(&lhs) {
                            return Ok(Value::Bool(false));
                        }
                        let rhs = self.eval_with_depth(right, context, depth + 1)?;
                        return Ok(Value::Bool(to_boolean(&rhs)));
                    }
                    BinaryOp::Or => {
                        let lhs = self.eval_with_depth(left, context, depth + 1)?;
                        if to_boolean(&lhs) {
                            return Ok(Value::Bool(true));
                        }
                        let rhs = self.eval_with_depth(right, context, depth + 1)?;
                        return Ok(Value::Bool(to_boolean(&rhs)));
                    }
                    _ => {}
                }

                let lhs = self.eval_with_depth(left, context, depth + 1)?;
                let rhs = self.eval_with_depth(right, context, depth + 1)?;
                self.eval_binary(*op, &lhs, &rhs)
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Value,
        rhs: &Value,
    ) -> Result<Value, ExpressionError> {
        match op {
            BinaryOp::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(lhs, rhs))),

            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(lhs, rhs)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }

            BinaryOp::Add => match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
                (Value::String(a), b) => Ok(Value::String(format!("{a}{}", stringify(b)))),
                (a, Value::String(b)) => Ok(Value::String(format!("{}{b}", stringify(a)))),
                _ => arithmetic(op, lhs, rhs),
            },

            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                arithmetic(op, lhs, rhs)
            }

            // Handled above; unreachable by construction.
            BinaryOp::And | BinaryOp::Or => Err(ExpressionError::Eval(
                "logical operator reached non-short-circuit path".into(),
            )),
        }
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, ExpressionError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Err(ExpressionError::Eval("numbers are not comparable".into()));
            };
            x.partial_cmp(&y)
                .ok_or_else(|| ExpressionError::Eval("NaN is not comparable".into()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExpressionError::Type {
            expected: "two numbers or two strings",
            actual: value_type_name(lhs),
        }),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExpressionError> {
    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(ExpressionError::Type {
            expected: "number",
            actual: value_type_name(if lhs.is_number() { rhs } else { lhs }),
        });
    };

    // Integer arithmetic stays integral where it can.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        match op {
            BinaryOp::Add => return Ok(Value::Number((x + y).into())),
            BinaryOp::Sub => return Ok(Value::Number((x - y).into())),
            BinaryOp::Mul => return Ok(Value::Number((x * y).into())),
            BinaryOp::Div if y != 0 && x % y == 0 => {
                return Ok(Value::Number((x / y).into()));
            }
            BinaryOp::Mod if y != 0 => return Ok(Value::Number((x % y).into())),
            BinaryOp::Mod => return Err(ExpressionError::Eval("modulo by zero".into())),
            _ => {}
        }
    }

    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(ExpressionError::Eval("numbers are not representable".into()));
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(ExpressionError::Eval("division by zero".into()));
            }
            x / y
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(ExpressionError::Eval("modulo by zero".into()));
            }
            x % y
        }
        _ => return Err(ExpressionError::Eval("not an arithmetic operator".into())),
    };
    serde_json::Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::Eval("arithmetic produced a non-finite number".into()))
}

/// Render a value the way templates do: strings bare, everything else JSON.
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn eval(source: &str, ctx: &EvaluationContext) -> Result<Value, ExpressionError> {
        Evaluator::new().eval(&parse(source)?, ctx)
    }

    fn ctx() -> EvaluationContext {
        let mut ctx = EvaluationContext::new();
        ctx.set("a", json!(10));
        ctx.set("b", json!(20));
        ctx.set("score", json!(0.7));
        ctx.set("name", json!("cascade"));
        ctx.set("output", json!({"ok": true, "items": [1, 2, 3]}));
        ctx
    }

    #[rstest]
    #[case("a + b", json!(30))]
    #[case("b - a", json!(10))]
    #[case("a * 3", json!(30))]
    #[case("b / a", json!(2))]
    #[case("b % 3", json!(2))]
    #[case("a + b * 2", json!(50))]
    #[case("(a + b) * 2", json!(60))]
    #[case("-a", json!(-10))]
    fn arithmetic_cases(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(eval(source, &ctx()).unwrap(), expected);
    }

    #[rstest]
    #[case("score > 0.5", true)]
    #[case("score <= 0.5", false)]
    #[case("a == 10", true)]
    #[case("a != 10", false)]
    #[case("name == 'cascade'", true)]
    #[case("name == ' cascade '", true)] // trimmed string equality
    #[case("score > 0.5 && a == 10", true)]
    #[case("score > 0.9 || a == 10", true)]
    #[case("!(score > 0.9)", true)]
    #[case("a > 1 and b > 1", true)]
    #[case("not (a > 1)", false)]
    fn boolean_cases(#[case] source: &str, #[case] expected: bool) {
        assert_eq!(eval(source, &ctx()).unwrap(), json!(expected));
    }

    #[test]
    fn property_access() {
        assert_eq!(eval("output.ok", &ctx()).unwrap(), json!(true));
        // Missing keys are null, not errors: conditions over optional
        // fields should not blow up evaluation.
        assert_eq!(eval("output.missing", &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn index_access() {
        assert_eq!(eval("output.items[1]", &ctx()).unwrap(), json!(2));
        assert_eq!(eval("output['ok']", &ctx()).unwrap(), json!(true));
        assert_eq!(eval("output.items[9]", &ctx()).unwrap(), Value::Null);
    }

    #[test]
    fn property_access_on_scalar_fails() {
        let err = eval("a.field", &ctx()).unwrap_err();
        assert!(matches!(err, ExpressionError::Type { expected: "object", .. }));
    }

    #[test]
    fn unknown_variable_fails() {
        let err = eval("ghost > 1", &ctx()).unwrap_err();
        assert!(matches!(err, ExpressionError::VariableNotFound(name) if name == "ghost"));
    }

    #[test]
    fn short_circuit_skips_rhs() {
        // `ghost` would fail, but the lhs decides the outcome first.
        assert_eq!(eval("a == 10 || ghost > 1", &ctx()).unwrap(), json!(true));
        assert_eq!(eval("a != 10 && ghost > 1", &ctx()).unwrap(), json!(false));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            eval("name + '-' + a", &ctx()).unwrap(),
            json!("cascade-10")
        );
    }

    #[test]
    fn division_by_zero_fails() {
        let err = eval("a / 0", &ctx()).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn float_division() {
        assert_eq!(eval("a / 4", &ctx()).unwrap(), json!(2.5));
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(eval("a == 10.0", &ctx()).unwrap(), json!(true));
    }
}
