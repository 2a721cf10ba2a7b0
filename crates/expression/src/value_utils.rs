//! Helpers for working with `serde_json::Value` the way the expression
//! language needs to: JS-like truthiness, numeric coercion, type names.

use serde_json::{Number, Value};

/// JS-like truthiness: `0`, `""`, `null`, `false` and empty arrays/objects
/// are falsy; everything else is truthy.
#[must_use]
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => number_as_f64(n).is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Extract an `i64` from a JSON number, if it's exactly representable.
#[must_use]
pub fn number_as_i64(n: &Number) -> Option<i64> {
    n.as_i64()
}

/// Extract an `f64` from a JSON number, widening integers as needed.
#[must_use]
pub fn number_as_f64(n: &Number) -> Option<f64> {
    n.as_f64()
}

/// Short type name used in type-error messages (`"number"`, `"array"`, ...).
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_and_empty_are_falsy() {
        assert!(!to_boolean(&json!(0)));
        assert!(!to_boolean(&json!("")));
        assert!(!to_boolean(&json!(null)));
        assert!(!to_boolean(&json!([])));
        assert!(!to_boolean(&json!({})));
    }

    #[test]
    fn nonzero_and_nonempty_are_truthy() {
        assert!(to_boolean(&json!(1)));
        assert!(to_boolean(&json!("x")));
        assert!(to_boolean(&json!([1])));
        assert!(to_boolean(&json!({"a": 1})));
    }
}
