//! Tree-walking evaluator for the expression AST.

use serde_json::Value;

use crate::ast::{BinaryOp, Expr, Stmt};
use crate::builtins::BuiltinRegistry;
use crate::context::EvaluationContext;
use crate::error::{EvalError, Span};
use crate::value_utils::{number_as_f64, number_as_i64, to_boolean, value_type_name};

/// Maximum recursion depth, protecting against pathological or
/// maliciously deep expressions.
const MAX_RECURSION_DEPTH: usize = 256;

const HIGHER_ORDER_FUNCTIONS: &[&str] = &["filter", "map", "reduce", "find", "every", "any", "all", "some"];

/// Evaluates a parsed [`Expr`] against an [`EvaluationContext`].
pub struct Evaluator {
    builtins: BuiltinRegistry,
}

impl Evaluator {
    /// Build an evaluator with the standard builtin function set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builtins: BuiltinRegistry::new(),
        }
    }

    /// Build an evaluator around a caller-supplied registry (e.g. one
    /// with extra or overridden builtins registered).
    #[must_use]
    pub fn with_builtins(builtins: BuiltinRegistry) -> Self {
        Self { builtins }
    }

    /// Evaluate `expr` against `context`.
    pub fn eval(&self, expr: &Expr, context: &EvaluationContext) -> Result<Value, EvalError> {
        self.eval_depth(expr, context, 0)
    }

    fn eval_depth(&self, expr: &Expr, context: &EvaluationContext, depth: usize) -> Result<Value, EvalError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(EvalError::new(format!(
                "maximum recursion depth ({MAX_RECURSION_DEPTH}) exceeded"
            )));
        }
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Variable(name) => Ok(context.resolve(name).unwrap_or(Value::Null)),
            Expr::SecretAccess(name) => context
                .resolve_secret(name)
                .map(Value::String)
                .ok_or_else(|| EvalError::unresolved_secret(Span::default(), name.as_ref())),
            Expr::Negate(inner) => {
                let val = self.eval_depth(inner, context, depth + 1)?;
                match &val {
                    Value::Number(n) => {
                        if let Some(i) = number_as_i64(n) {
                            Ok(Value::Number((-i).into()))
                        } else {
                            let f = number_as_f64(n).unwrap_or(0.0);
                            Ok(serde_json::json!(-f))
                        }
                    }
                    _ => Err(EvalError::new(format!(
                        "cannot negate non-number value of type {}",
                        value_type_name(&val)
                    ))),
                }
            }
            Expr::Not(inner) => {
                let val = self.eval_depth(inner, context, depth + 1)?;
                Ok(Value::Bool(!to_boolean(&val)))
            }
            Expr::Binary { left, op, right } => self.eval_binary(*op, left, right, context, depth),
            Expr::PropertyAccess { object, property } => {
                let obj = self.eval_depth(object, context, depth + 1)?;
                access_property(&obj, property)
            }
            Expr::IndexAccess { object, index } => {
                let obj = self.eval_depth(object, context, depth + 1)?;
                let idx = self.eval_depth(index, context, depth + 1)?;
                access_index(&obj, &idx)
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval_depth(condition, context, depth + 1)?;
                if to_boolean(&cond) {
                    self.eval_depth(then_branch, context, depth + 1)
                } else {
                    self.eval_depth(else_branch, context, depth + 1)
                }
            }
            Expr::Array(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for el in elements {
                    out.push(self.eval_depth(el, context, depth + 1)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(pairs) => {
                let mut map = serde_json::Map::new();
                for (key, value_expr) in pairs {
                    map.insert(key.clone(), self.eval_depth(value_expr, context, depth + 1)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Lambda { .. } => Err(EvalError::new(
                "arrow functions can only be invoked directly or passed to a higher-order function",
            )),
            Expr::Block(stmts) => self.eval_block(stmts, context, depth),
            Expr::Call { callee, args } => self.eval_call(callee, args, context, depth),
        }
    }

    fn eval_block(&self, stmts: &[Stmt], context: &EvaluationContext, depth: usize) -> Result<Value, EvalError> {
        let mut scope = context.clone();
        for stmt in stmts {
            match stmt {
                Stmt::Return(Some(e)) => return self.eval_depth(e, &scope, depth + 1),
                Stmt::Return(None) => return Ok(Value::Null),
                Stmt::Let(name, e) => {
                    let value = self.eval_depth(e, &scope, depth + 1)?;
                    scope.bind(name.clone(), value);
                }
                Stmt::Expr(e) => {
                    self.eval_depth(e, &scope, depth + 1)?;
                }
            }
        }
        Ok(Value::Null)
    }

    fn eval_call(&self, callee: &Expr, args: &[Expr], context: &EvaluationContext, depth: usize) -> Result<Value, EvalError> {
        // console.log(...) is a side-effecting special form, not a builtin.
        if let Expr::PropertyAccess { object, property } = callee {
            if let Expr::Variable(base) = object.as_ref() {
                if base.as_ref() == "console" && property.as_ref() == "log" {
                    let mut rendered = Vec::with_capacity(args.len());
                    for arg in args {
                        let value = self.eval_depth(arg, context, depth + 1)?;
                        rendered.push(match &value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        });
                    }
                    context.console_log(&rendered.join(" "));
                    return Ok(Value::Null);
                }
            }
        }

        if let Expr::Variable(name) = callee {
            if HIGHER_ORDER_FUNCTIONS.contains(&name.as_ref()) {
                return self.eval_higher_order(name, args, context, depth);
            }
            if let Some(func) = self.builtins.get(name) {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_depth(arg, context, depth + 1)?);
                }
                return func(&values);
            }
        }

        // Anything else: an IIFE, e.g. `(x => x + 1)(5)`.
        if let Expr::Lambda { param, body } = callee {
            if args.len() != 1 {
                return Err(EvalError::new("arrow function invoked with wrong argument count"));
            }
            let value = self.eval_depth(&args[0], context, depth + 1)?;
            let mut scope = context.clone();
            scope.bind(param.clone(), value);
            return self.eval_depth(body, &scope, depth + 1);
        }

        Err(EvalError::new("expression is not callable"))
    }

    fn eval_higher_order(&self, name: &str, args: &[Expr], context: &EvaluationContext, depth: usize) -> Result<Value, EvalError> {
        match name {
            "reduce" => {
                if args.len() != 3 {
                    return Err(EvalError::new("reduce expects 3 arguments: array, initial, lambda"));
                }
                let array = self.eval_array_arg(&args[0], context, depth)?;
                let mut acc = self.eval_depth(&args[1], context, depth + 1)?;
                let (param, body) = lambda_parts(&args[2])?;
                for item in array {
                    let mut scope = context.clone();
                    scope.bind("$acc", acc.clone());
                    scope.bind(param.clone(), item);
                    acc = self.eval_depth(body, &scope, depth + 1)?;
                }
                Ok(acc)
            }
            _ => {
                if args.len() != 2 {
                    return Err(EvalError::new(format!("{name} expects 2 arguments: array, lambda")));
                }
                let array = self.eval_array_arg(&args[0], context, depth)?;
                let (param, body) = lambda_parts(&args[1])?;
                match name {
                    "filter" => {
                        let mut out = Vec::new();
                        for item in array {
                            if to_boolean(&self.call_lambda(param, body, item.clone(), context, depth)?) {
                                out.push(item);
                            }
                        }
                        Ok(Value::Array(out))
                    }
                    "map" => {
                        let mut out = Vec::with_capacity(array.len());
                        for item in array {
                            out.push(self.call_lambda(param, body, item, context, depth)?);
                        }
                        Ok(Value::Array(out))
                    }
                    "find" => {
                        for item in array {
                            if to_boolean(&self.call_lambda(param, body, item.clone(), context, depth)?) {
                                return Ok(item);
                            }
                        }
                        Ok(Value::Null)
                    }
                    "every" | "all" => {
                        for item in array {
                            if !to_boolean(&self.call_lambda(param, body, item, context, depth)?) {
                                return Ok(Value::Bool(false));
                            }
                        }
                        Ok(Value::Bool(true))
                    }
                    "some" | "any" => {
                        for item in array {
                            if to_boolean(&self.call_lambda(param, body, item, context, depth)?) {
                                return Ok(Value::Bool(true));
                            }
                        }
                        Ok(Value::Bool(false))
                    }
                    _ => unreachable!("not a registered higher-order function"),
                }
            }
        }
    }

    fn eval_array_arg(&self, expr: &Expr, context: &EvaluationContext, depth: usize) -> Result<Vec<Value>, EvalError> {
        match self.eval_depth(expr, context, depth + 1)? {
            Value::Array(a) => Ok(a),
            other => Err(EvalError::new(format!(
                "expected array, got {}",
                value_type_name(&other)
            ))),
        }
    }

    fn call_lambda(
        &self,
        param: &std::sync::Arc<str>,
        body: &Expr,
        value: Value,
        context: &EvaluationContext,
        depth: usize,
    ) -> Result<Value, EvalError> {
        let mut scope = context.clone();
        scope.bind(param.clone(), value);
        self.eval_depth(body, &scope, depth + 1)
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        context: &EvaluationContext,
        depth: usize,
    ) -> Result<Value, EvalError> {
        match op {
            BinaryOp::And => {
                let l = self.eval_depth(left, context, depth + 1)?;
                if !to_boolean(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval_depth(right, context, depth + 1)?;
                Ok(Value::Bool(to_boolean(&r)))
            }
            BinaryOp::Or => {
                let l = self.eval_depth(left, context, depth + 1)?;
                if to_boolean(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval_depth(right, context, depth + 1)?;
                Ok(Value::Bool(to_boolean(&r)))
            }
            _ => {
                let l = self.eval_depth(left, context, depth + 1)?;
                let r = self.eval_depth(right, context, depth + 1)?;
                match op {
                    BinaryOp::Add => add(&l, &r),
                    BinaryOp::Subtract => numeric_op(&l, &r, |a, b| a - b),
                    BinaryOp::Multiply => numeric_op(&l, &r, |a, b| a * b),
                    BinaryOp::Divide => {
                        let rf = as_f64(&r)?;
                        if rf == 0.0 {
                            return Err(EvalError::new("division by zero"));
                        }
                        numeric_op(&l, &r, |a, b| a / b)
                    }
                    BinaryOp::Modulo => {
                        let rf = as_f64(&r)?;
                        if rf == 0.0 {
                            return Err(EvalError::new("division by zero"));
                        }
                        numeric_op(&l, &r, |a, b| a % b)
                    }
                    BinaryOp::Equal => Ok(Value::Bool(l == r)),
                    BinaryOp::NotEqual => Ok(Value::Bool(l != r)),
                    BinaryOp::LessThan => compare(&l, &r, |o| o == std::cmp::Ordering::Less),
                    BinaryOp::GreaterThan => compare(&l, &r, |o| o == std::cmp::Ordering::Greater),
                    BinaryOp::LessEqual => compare(&l, &r, |o| o != std::cmp::Ordering::Greater),
                    BinaryOp::GreaterEqual => compare(&l, &r, |o| o != std::cmp::Ordering::Less),
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                }
            }
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn lambda_parts(expr: &Expr) -> Result<(&std::sync::Arc<str>, &Expr), EvalError> {
    match expr {
        Expr::Lambda { param, body } => Ok((param, body)),
        _ => Err(EvalError::new("expected an arrow function argument")),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => numeric_op(left, right, |a, b| a + b),
        (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
        (Value::String(l), other) => Ok(Value::String(format!("{l}{other}"))),
        (other, Value::String(r)) => Ok(Value::String(format!("{other}{r}"))),
        _ => Err(EvalError::new(format!(
            "cannot add {} and {}",
            value_type_name(left),
            value_type_name(right)
        ))),
    }
}

fn as_f64(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Number(n) => number_as_f64(n).ok_or_else(|| EvalError::new("number out of range")),
        other => Err(EvalError::new(format!(
            "expected number, got {}",
            value_type_name(other)
        ))),
    }
}

fn numeric_op(left: &Value, right: &Value, op: impl Fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    let lf = as_f64(left)?;
    let rf = as_f64(right)?;
    let result = op(lf, rf);
    if let (Value::Number(l), Value::Number(r)) = (left, right) {
        if let (Some(li), Some(ri)) = (number_as_i64(l), number_as_i64(r)) {
            let _ = (li, ri);
            if result.fract() == 0.0 && result.abs() < i64::MAX as f64 {
                return Ok(Value::Number((result as i64).into()));
            }
        }
    }
    Ok(serde_json::json!(result))
}

fn compare(left: &Value, right: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let lf = as_f64(left)?;
            let rf = as_f64(right)?;
            lf.partial_cmp(&rf)
                .map(|o| Value::Bool(accept(o)))
                .ok_or_else(|| EvalError::new("cannot compare NaN"))
        }
        (Value::String(l), Value::String(r)) => Ok(Value::Bool(accept(l.cmp(r)))),
        _ => Err(EvalError::new(format!(
            "cannot compare {} and {}",
            value_type_name(left),
            value_type_name(right)
        ))),
    }
}

fn access_property(obj: &Value, property: &str) -> Result<Value, EvalError> {
    match obj {
        Value::Object(o) => Ok(o.get(property).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        _ => Err(EvalError::new(format!(
            "cannot access property '{property}' of {}",
            value_type_name(obj)
        ))),
    }
}

fn access_index(obj: &Value, index: &Value) -> Result<Value, EvalError> {
    match obj {
        Value::Array(arr) => {
            let idx = match index {
                Value::Number(n) => number_as_i64(n).ok_or_else(|| EvalError::new("index out of range"))?,
                other => {
                    return Err(EvalError::new(format!(
                        "array index must be a number, got {}",
                        value_type_name(other)
                    )))
                }
            };
            let len = arr.len() as i64;
            let actual = if idx < 0 { len + idx } else { idx };
            if actual < 0 || actual >= len {
                return Ok(Value::Null);
            }
            Ok(arr[actual as usize].clone())
        }
        Value::Object(o) => {
            let key = match index {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(o.get(&key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(EvalError::new(format!(
            "cannot index into {}",
            value_type_name(obj)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use serde_json::json;

    fn eval_str(src: &str, ctx: &EvaluationContext) -> Value {
        let expr = parse_expression(src).unwrap();
        Evaluator::new().eval(&expr, ctx).unwrap()
    }

    #[test]
    fn arithmetic_preserves_integer_type() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval_str("1 + 2 * 3", &ctx), json!(7));
    }

    #[test]
    fn ternary_picks_branch() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval_str("1 > 0 ? \"yes\" : \"no\"", &ctx), json!("yes"));
    }

    #[test]
    fn map_with_lambda() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval_str("map([1, 2, 3], x => x * 2)", &ctx), json!([2, 4, 6]));
    }

    #[test]
    fn filter_with_lambda() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval_str("filter([1, 2, 3, 4], x => x > 2)", &ctx), json!([3, 4]));
    }

    #[test]
    fn reduce_with_lambda_and_accumulator() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval_str("reduce([1, 2, 3], 0, x => $acc + x)", &ctx), json!(6));
    }

    #[test]
    fn arrow_iife_invokes_immediately() {
        let ctx = EvaluationContext::new();
        assert_eq!(eval_str("(x => x + 1)(41)", &ctx), json!(42));
    }

    #[test]
    fn division_by_zero_errors() {
        let ctx = EvaluationContext::new();
        let expr = parse_expression("1 / 0").unwrap();
        assert!(Evaluator::new().eval(&expr, &ctx).is_err());
    }

    #[test]
    fn unknown_secret_throws_when_used_in_a_script() {
        let ctx = EvaluationContext::new();
        let expr = parse_expression("secrets.api_key").unwrap();
        let err = Evaluator::new().eval(&expr, &ctx).unwrap_err();
        assert_eq!(err.unresolved_secret.as_deref(), Some("api_key"));
    }

    #[test]
    fn known_secret_resolves_to_its_value() {
        let ctx = EvaluationContext::builder()
            .secrets([("api_key".to_string(), "sk-abc".to_string())].into_iter().collect())
            .build();
        assert_eq!(eval_str("secrets.api_key", &ctx), json!("sk-abc"));
    }

    #[test]
    fn property_access_on_input() {
        let ctx = EvaluationContext::builder().input(json!({"name": "ada"})).build();
        assert_eq!(eval_str("input.name", &ctx), json!("ada"));
    }

    #[test]
    fn console_log_invokes_sink_and_returns_null() {
        use std::sync::{Arc, Mutex};

        struct Capture(Mutex<Vec<String>>);
        impl crate::context::ConsoleSink for Capture {
            fn log(&self, message: &str) {
                self.0.lock().unwrap().push(message.to_string());
            }
        }

        let sink = Arc::new(Capture(Mutex::new(Vec::new())));
        let ctx = EvaluationContext::builder().console(sink.clone()).build();
        let result = eval_str("console.log(\"hi\")", &ctx);
        assert_eq!(result, Value::Null);
        assert_eq!(sink.0.lock().unwrap().as_slice(), &["hi".to_string()]);
    }
}
