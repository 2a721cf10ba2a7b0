//! `transform`: runs `script` against `input`, returns its value as
//! output. The simplest node, and the template every other script-
//! driven builtin follows.

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

pub struct TransformNode {
    engine: Arc<ExpressionEngine>,
    params: Map<String, Value>,
}

impl TransformNode {
    fn from_descriptor(descriptor: &NodeDescriptor) -> Result<Self, NodeBuildError> {
        if !descriptor.params.contains_key("script") {
            return Err(NodeBuildError::InvalidParams {
                node_type: "transform".to_string(),
                reason: "missing required param \"script\"".to_string(),
            });
        }
        Ok(Self {
            engine: Arc::new(ExpressionEngine::new()),
            params: descriptor.params.clone(),
        })
    }
}

#[async_trait]
impl Node for TransformNode {
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        prep_common(ctx, node_id, input, &self.params, &self.engine, &["script"]).await
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        let script = prepared.param_str("script").unwrap_or_default();
        self.engine.evaluate(script, &prepared.eval_ctx).map_err(NodeError::from)
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
    Arc::new(|descriptor| Ok(Arc::new(TransformNode::from_descriptor(descriptor)?) as Arc<dyn Node>))
}
