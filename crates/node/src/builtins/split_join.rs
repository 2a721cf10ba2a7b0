//! `split`/`join` marker nodes.
//!
//! Real branch spawning and join rendezvous need graph-level access
//! (the set of branch successors, the paired split's arrival count)
//! that a single node instance never has — the teacher's own
//! `WorkflowEngine::resolve_node_input` merges diamond-join
//! predecessor outputs directly in the interpreter rather than through
//! a generic node type, and `flowrunner-engine` follows the same
//! shape: it special-cases `descriptor.node_type` before generic
//! dispatch. A `split` runs its own lifecycle once and fans the result
//! out to every branch; a `join` only runs its lifecycle once, for the
//! single branch whose arrival completes the count — every other
//! branch registers its value and returns without ever calling this
//! node's `prep`/`exec`/`post`.
//!
//! These are registered anyway so the registry lists `split`/`join` as
//! valid types (a flow descriptor naming them must resolve to
//! *something*), and so a plugin author who wants custom pass-through
//! behavior for a non-interpreter caller has a sane default to
//! override.

use std::sync::Arc;

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::EvaluationContext;
use flowrunner_workflow::NodeDescriptor;
use serde_json::{Map, Value};

use crate::error::{NodeBuildError, NodeError};
use crate::node::{JoinFormat, Node, NodePost, PreparedNode};
use crate::registry::NodeFactory;

pub struct SplitNode;
pub struct JoinNode {
    pub format: JoinFormat,
}

impl JoinNode {
    fn from_descriptor(descriptor: &NodeDescriptor) -> Result<Self, NodeBuildError> {
        let format = match descriptor.params.get("format").and_then(Value::as_str) {
            None | Some("object") => JoinFormat::Object,
            Some("array") => JoinFormat::Array,
            Some(other) => {
                return Err(NodeBuildError::InvalidParams {
                    node_type: "join".to_string(),
                    reason: format!("unknown join format {other:?}, expected \"object\" or \"array\""),
                })
            }
        };
        Ok(Self { format })
    }
}

#[async_trait]
impl Node for SplitNode {
    async fn prep(&self, _ctx: &ExecutionContext, _node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        Ok(PreparedNode { params: Map::new(), input, eval_ctx: EvaluationContext::new() })
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        Ok(prepared.input.clone())
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

#[async_trait]
impl Node for JoinNode {
    async fn prep(&self, _ctx: &ExecutionContext, _node_id: &str, input: Value) -> Result<PreparedNode, NodeError> {
        Ok(PreparedNode { params: Map::new(), input, eval_ctx: EvaluationContext::new() })
    }

    async fn exec(&self, _ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError> {
        Ok(prepared.input.clone())
    }

    async fn post(
        &self,
        _ctx: &ExecutionContext,
        _prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError> {
        Ok(NodePost::success(result))
    }

    fn join_format(&self) -> JoinFormat {
        self.format
    }
}

#[must_use]
pub fn split_factory() -> NodeFactory {
    Arc::new(|_descriptor| Ok(Arc::new(SplitNode) as Arc<dyn Node>))
}

#[must_use]
pub fn join_factory() -> NodeFactory {
    Arc::new(|descriptor| Ok(Arc::new(JoinNode::from_descriptor(descriptor)?) as Arc<dyn Node>))
}
