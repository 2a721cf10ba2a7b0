//! `wait`: sleeps for `duration`, a suspension point per
//! SPEC_FULL.md §4.E — races the sleep against cooperative
//! cancellation so a canceled execution doesn't sit out the full delay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::ExpressionEngine;
use flowrunner_workflow::NodeDescriptor;
use serde_json::{Map, Value};

use crate::error::{NodeBuildError, NodeError};
use crate::node::{Node, NodePost, PreparedNode};
use crate::registry::NodeFactory;

use super::template_params::prep_common;

pub struct WaitNode {
    engine: Arc<ExpressionEngine>,
    params: Map<String, Value>,
}

impl WaitNode {
    fn from_descriptor(descriptor: &NodeDescriptor) -> Result<Self, NodeBuildError> {
        if !descriptor.params.contains_key("duration") {
            return Err(NodeBuildError::InvalidParams {
                node_type: "wait".to_string(),
                reason: "missing required param \"duration\"".to_string(),
            });
        }
        Ok(Self {
            engine: Arc::new(ExpressionEngine::new()),
            params: descriptor.params.clone(),
        })
    }
}

/// Accepts either a plain millisecond number or a duration string
/// (`"5s"`, `"250ms"`, `"2m"`).
fn parse_duration_param(value: &Value) -> Result<Duration, NodeError> {
    match value {
        Value::Number(n) => {
            let millis = n
                .as_u64()
                .ok_or_else(|| NodeError::exec("duration must be a non-negative number"))?;
            Ok(Duration::from_millis(millis))
        }
        Value::String(s) => parse_duration_str(s),
        other => Err(NodeError::exec(format!("duration must be a number or string, got {other}"))),
    }
}

fn parse_duration_str(s: &str) -> Result<Duration, NodeError> {
    let s = s.trim();
    let (number, unit) = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .map_or((s, ""), |idx| s.split_at(idx));
    let number: f64 = number
        .parse()
        .map_err(|_| NodeError::exec(format!("invalid duration {s:?}")))?;
    let millis = match unit {
        "ms" => number,
        "s" | "" => number * 1_000.0,
        "m" => number * 60_000.0,
        "h" => number * 3_600_000.0,
        other => return Err(NodeError::exec(format!("unknown duration unit {other:?}"))),
    };
    Ok(Duration::from_millis(millis.max(0.0) as u64))
}

#[async_trait]
impl Node for WaitNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &[]).await
    }

    async fn exec(&self, ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let duration = prepared
            .params
            .get("duration")
            .ok_or_else(|| NodeError::exec("missing duration"))
            .and_then(parse_duration_param)?;

        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(prepared.input.clone()),
            () = ctx.cancellation().cancelled() => Err(NodeError::Cancelled),
        }
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        _prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        Ok(NodePost::success(result))
    }
}

#[must_use]
pub fn factory() -> NodeFactory {
    Arc::new(|descriptor| Ok(Arc::new(WaitNode::from_descriptor(descriptor)?) as Arc<dyn Node>))
}
