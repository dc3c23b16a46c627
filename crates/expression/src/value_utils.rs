//! Helpers for working with JSON values during evaluation.

use serde_json::Value;

/// Human-readable type name for error messages.
#[must_use]
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truthiness: null and false are false; zero and the empty string are
/// false; everything else (including empty containers) is true.
#[must_use]
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric view of a value, if it has one.
#[must_use]
pub fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Deep equality with numeric coercion (`1 == 1.0`) and whitespace-trimmed
/// string comparison, so values that passed through templating compare the
/// way workflow authors expect.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => a.trim() == b.trim(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!to_boolean(&Value::Null));
        assert!(!to_boolean(&json!(false)));
        assert!(!to_boolean(&json!(0)));
        assert!(!to_boolean(&json!("")));
        assert!(to_boolean(&json!(1)));
        assert!(to_boolean(&json!("x")));
        assert!(to_boolean(&json!([])));
        assert!(to_boolean(&json!({})));
    }

    #[test]
    fn numeric_equality_coerces() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(2)));
    }

    #[test]
    fn string_equality_trims() {
        assert!(values_equal(&json!(" ok "), &json!("ok")));
        assert!(!values_equal(&json!("ok"), &json!("OK")));
    }

    #[test]
    fn deep_equality() {
        assert!(values_equal(&json!({"a": [1, "x "]}), &json!({"a": [1.0, "x"]})));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn type_names() {
        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!([1])), "array");
    }
}
