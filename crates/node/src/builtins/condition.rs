//! `condition`: runs `condition_script`; its return value becomes the
//! outgoing action label. Unlike `transform`, the *input* passes
//! through unchanged — a condition only steers routing, it doesn't
//! transform the value flowing downstream.

use std::sync::Arc;

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::ExpressionEngine;
use flowrunner_workflow::NodeDescriptor;
use serde_json::{Map, Value};

use crate::error::{NodeBuildError, NodeError};
use crate::node::{Node, NodePost, PreparedNode};
use crate::registry::NodeFactory;

use super::template_params::prep_common;

pub struct ConditionNode {
    engine: Arc<ExpressionEngine>,
    params: Map<String, Value>,
}

impl ConditionNode {
    fn from_descriptor(descriptor: &NodeDescriptor) -> Result<Self, NodeBuildError> {
        if !descriptor.params.contains_key("condition_script") {
            return Err(NodeBuildError::InvalidParams {
                node_type: "condition".to_string(),
                reason: "missing required param \"condition_script\"".to_string(),
            });
        }
        Ok(Self {
            engine: Arc::new(ExpressionEngine::new()),
            params: descriptor.params.clone(),
        })
    }
}

/// Render a script's return value as an action label. Strings pass
/// through as-is; booleans map to the conventional `true`/`false`
/// labels so a condition script can `return true;` without spelling
/// out string literals; everything else is JSON-stringified.
fn value_as_action_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Node for ConditionNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &["condition_script"]).await
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let script = prepared.param_str("condition_script").unwrap_or_default();
        self.engine.evaluate(script, &prepared.eval_ctx).map_err(NodeError::from)
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        Ok(NodePost::with_action(prepared.input.clone(), value_as_action_label(&result)))
    }
}

#[must_use]
pub fn factory() -> NodeFactory {
    Arc::new(|descriptor| Ok(Arc::new(ConditionNode::from_descriptor(descriptor)?) as Arc<dyn Node>))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_label_renders_without_quotes() {
        assert_eq!(value_as_action_label(&Value::Bool(true)), "true");
    }

    #[test]
    fn string_label_passes_through() {
        assert_eq!(value_as_action_label(&Value::String("urgent".to_string())), "urgent");
    }
}
