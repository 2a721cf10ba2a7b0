//! Built-in functions callable from expression bodies.
//!
//! Organized the way the evaluator looks them up: a flat name -> function
//! pointer table, grouped into string/math/array/object/conversion
//! categories purely for readability of the registration code below.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::EvalError;
use crate::value_utils::{number_as_f64, to_boolean, value_type_name};

/// Signature every builtin function implements.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, EvalError>;

/// Lookup table of builtin functions available to expression bodies.
pub struct BuiltinRegistry {
    functions: HashMap<&'static str, BuiltinFn>,
}

impl BuiltinRegistry {
    /// Build a registry with the standard function set installed.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_string();
        registry.register_math();
        registry.register_array();
        registry.register_object();
        registry.register_conversion();
        registry
    }

    /// Register or override a builtin function.
    pub fn register(&mut self, name: &'static str, func: BuiltinFn) {
        self.functions.insert(name, func);
    }

    /// Look up a builtin function by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.functions.get(name).copied()
    }

    /// Whether a builtin by this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn register_string(&mut self) {
        self.register("uppercase", |args| {
            Ok(Value::String(arg_str(args, 0)?.to_uppercase()))
        });
        self.register("lowercase", |args| {
            Ok(Value::String(arg_str(args, 0)?.to_lowercase()))
        });
        self.register("trim", |args| {
            Ok(Value::String(arg_str(args, 0)?.trim().to_string()))
        });
        self.register("length", |args| match args.first() {
            Some(Value::String(s)) => Ok(Value::Number(s.chars().count().into())),
            Some(Value::Array(a)) => Ok(Value::Number(a.len().into())),
            Some(Value::Object(o)) => Ok(Value::Number(o.len().into())),
            Some(other) => Err(EvalError::new(format!(
                "length: expected string, array or object, got {}",
                value_type_name(other)
            ))),
            None => Err(EvalError::new("length: missing argument")),
        });
        self.register("split", |args| {
            let s = arg_str(args, 0)?;
            let sep = arg_str(args, 1)?;
            let parts = s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect();
            Ok(Value::Array(parts))
        });
        self.register("concat", |args| {
            let mut out = String::new();
            for arg in args {
                match arg {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
            Ok(Value::String(out))
        });
        self.register("contains", |args| {
            let s = arg_str(args, 0)?;
            let needle = arg_str(args, 1)?;
            Ok(Value::Bool(s.contains(needle.as_str())))
        });
    }

    fn register_math(&mut self) {
        self.register("round", |args| Ok(Value::Number(json_number(arg_f64(args, 0)?.round()))));
        self.register("floor", |args| Ok(Value::Number(json_number(arg_f64(args, 0)?.floor()))));
        self.register("ceil", |args| Ok(Value::Number(json_number(arg_f64(args, 0)?.ceil()))));
        self.register("abs", |args| Ok(Value::Number(json_number(arg_f64(args, 0)?.abs()))));
        self.register("min", |args| {
            let mut best = f64::INFINITY;
            for (i, _) in args.iter().enumerate() {
                best = best.min(arg_f64(args, i)?);
            }
            Ok(Value::Number(json_number(best)))
        });
        self.register("max", |args| {
            let mut best = f64::NEG_INFINITY;
            for (i, _) in args.iter().enumerate() {
                best = best.max(arg_f64(args, i)?);
            }
            Ok(Value::Number(json_number(best)))
        });
    }

    fn register_array(&mut self) {
        self.register("join", |args| {
            let arr = arg_array(args, 0)?;
            let sep = arg_str(args, 1)?;
            let parts: Vec<String> = arr
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            Ok(Value::String(parts.join(sep.as_str())))
        });
        self.register("first", |args| {
            Ok(arg_array(args, 0)?.first().cloned().unwrap_or(Value::Null))
        });
        self.register("last", |args| {
            Ok(arg_array(args, 0)?.last().cloned().unwrap_or(Value::Null))
        });
    }

    fn register_object(&mut self) {
        self.register("keys", |args| match args.first() {
            Some(Value::Object(o)) => Ok(Value::Array(o.keys().map(|k| Value::String(k.clone())).collect())),
            _ => Err(EvalError::new("keys: expected object")),
        });
        self.register("values", |args| match args.first() {
            Some(Value::Object(o)) => Ok(Value::Array(o.values().cloned().collect())),
            _ => Err(EvalError::new("values: expected object")),
        });
    }

    fn register_conversion(&mut self) {
        self.register("to_string", |args| match args.first() {
            Some(Value::String(s)) => Ok(Value::String(s.clone())),
            Some(other) => Ok(Value::String(other.to_string())),
            None => Err(EvalError::new("to_string: missing argument")),
        });
        self.register("to_number", |args| {
            Ok(Value::Number(json_number(arg_f64(args, 0)?)))
        });
        self.register("to_boolean", |args| match args.first() {
            Some(v) => Ok(Value::Bool(to_boolean(v))),
            None => Err(EvalError::new("to_boolean: missing argument")),
        });
        self.register("json_stringify", |args| match args.first() {
            Some(v) => Ok(Value::String(
                serde_json::to_string(v).map_err(|e| EvalError::new(e.to_string()))?,
            )),
            None => Err(EvalError::new("json_stringify: missing argument")),
        });
        self.register("json_parse", |args| {
            let s = arg_str(args, 0)?;
            serde_json::from_str(&s).map_err(|e| EvalError::new(e.to_string()))
        });
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn arg_str(args: &[Value], idx: usize) -> Result<String, EvalError> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(EvalError::new(format!(
            "expected string argument at position {idx}, got {}",
            value_type_name(other)
        ))),
        None => Err(EvalError::new(format!("missing argument at position {idx}"))),
    }
}

fn arg_f64(args: &[Value], idx: usize) -> Result<f64, EvalError> {
    match args.get(idx) {
        Some(Value::Number(n)) => number_as_f64(n).ok_or_else(|| EvalError::new("number out of range")),
        Some(other) => Err(EvalError::new(format!(
            "expected number argument at position {idx}, got {}",
            value_type_name(other)
        ))),
        None => Err(EvalError::new(format!("missing argument at position {idx}"))),
    }
}

fn arg_array(args: &[Value], idx: usize) -> Result<Vec<Value>, EvalError> {
    match args.get(idx) {
        Some(Value::Array(a)) => Ok(a.clone()),
        Some(other) => Err(EvalError::new(format!(
            "expected array argument at position {idx}, got {}",
            value_type_name(other)
        ))),
        None => Err(EvalError::new(format!("missing argument at position {idx}"))),
    }
}

fn json_number(f: f64) -> serde_json::Number {
    serde_json::Number::from_f64(f).unwrap_or_else(|| 0.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uppercase_roundtrip() {
        let registry = BuiltinRegistry::new();
        let f = registry.get("uppercase").unwrap();
        assert_eq!(f(&[json!("hi")]).unwrap(), json!("HI"));
    }

    #[test]
    fn length_works_on_string_array_object() {
        let registry = BuiltinRegistry::new();
        let f = registry.get("length").unwrap();
        assert_eq!(f(&[json!("abc")]).unwrap(), json!(3));
        assert_eq!(f(&[json!([1, 2])]).unwrap(), json!(2));
        assert_eq!(f(&[json!({"a": 1, "b": 2})]).unwrap(), json!(2));
    }

    #[test]
    fn unknown_builtin_is_none() {
        let registry = BuiltinRegistry::new();
        assert!(registry.get("does_not_exist").is_none());
    }
}
