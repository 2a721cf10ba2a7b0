//! Shared param-substitution helpers every built-in node uses in `prep`.

use flowrunner_execution::ExecutionContext;
use flowrunner_expression::{EvaluationContext, ExpressionEngine};
use serde_json::{Map, Value};

use crate::error::NodeError;
use crate::node::PreparedNode;

/// Recursively substitute `${...}` templates through every string leaf
/// of `value`. Arrays and objects are walked; non-string scalars pass
/// through unchanged.
pub fn substitute_value(
    engine: &ExpressionEngine,
    value: &Value,
    ctx: &EvaluationContext,
) -> Result<Value, NodeError> {
    match value {
        Value::String(s) => engine.substitute(s, ctx).map_err(|e| NodeError::prep(e.to_string())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(substitute_value(engine, item, ctx)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_value(engine, v, ctx)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute every param except the keys in `skip`, which are copied
/// through verbatim — used for `script`/`condition_script`/
/// `processor_script` bodies, which are evaluated as full expression
/// programs, not scanned as `${...}` templates.
pub fn substitute_params(
    engine: &ExpressionEngine,
    raw: &Map<String, Value>,
    ctx: &EvaluationContext,
    skip: &[&str],
) -> Result<Map<String, Value>, NodeError> {
    let mut out = Map::with_capacity(raw.len());
    for (key, value) in raw {
        if skip.contains(&key.as_str()) {
            out.insert(key.clone(), value.clone());
        } else {
            out.insert(key.clone(), substitute_value(engine, value, ctx)?);
        }
    }
    Ok(out)
}

/// Collect every string leaf of `value` into `out`, for secret-reference
/// scanning before resolution (SPEC_FULL.md §4.A "lazy decrypt").
pub fn collect_string_sources<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s.as_str()),
        Value::Array(items) => items.iter().for_each(|v| collect_string_sources(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_string_sources(v, out)),
        _ => {}
    }
}

/// Standard `prep` implementation shared by every built-in node: scans
/// every param string for `secrets.*` references, builds the
/// per-evaluation context, and substitutes every param not named in
/// `skip`.
pub async fn prep_common(
    ctx: &ExecutionContext,
    node_id: &str,
    input: Value,
    raw_params: &Map<String, Value>,
    engine: &ExpressionEngine,
    skip: &[&str],
) -> Result<PreparedNode, NodeError> {
    let mut sources = Vec::new();
    collect_string_sources(&Value::Object(raw_params.clone()), &mut sources);

    let eval_ctx = ctx
        .build_evaluation_context(node_id, input.clone(), &sources)
        .await
        .map_err(|e| NodeError::prep(e.to_string()))?;

    let params = substitute_params(engine, raw_params, &eval_ctx, skip)?;

    Ok(PreparedNode { params, input, eval_ctx })
}
