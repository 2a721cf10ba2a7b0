//! The node lifecycle: prep → exec → post.
//!
//! A [`Node`] instance is immutable, constructed once per graph node by
//! a [`crate::registry::NodeFactory`] from that node's descriptor, and
//! reused across every execution that walks the graph. Per-execution
//! state never lives on the node itself — it's threaded through the
//! `ExecutionContext` argument each phase receives.

use async_trait::async_trait;
use flowrunner_execution::ExecutionContext;
use flowrunner_expression::EvaluationContext;
use serde_json::{Map, Value};

use crate::error::NodeError;

/// What `prep` hands to `exec`: the node's params with every `${...}`
/// template resolved, the input value the node is running against, and
/// the evaluation context built for this step (so `exec` can run a
/// script body without re-resolving secrets or re-snapshotting `shared`).
#[derive(Debug, Clone)]
pub struct PreparedNode {
    pub params: Map<String, Value>,
    pub input: Value,
    pub eval_ctx: EvaluationContext,
}

impl PreparedNode {
    /// A param as a string, for scripts/URLs/templates that must be text.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

/// What `post` hands back to the interpreter: the value the successor
/// node should see as its `input`, and the action label that selects
/// which successor edge to follow.
#[derive(Debug, Clone)]
pub struct NodePost {
    pub next_input: Value,
    pub action: String,
}

impl NodePost {
    /// The conventional "happy path" outcome: the interpreter's own
    /// `default`/`success` edge resolution decides routing from here.
    #[must_use]
    pub fn success(next_input: Value) -> Self {
        Self {
            next_input,
            action: flowrunner_workflow::SUCCESS_ACTION.to_string(),
        }
    }

    /// An outcome under an explicit, non-`success` action label (used by
    /// `condition`, and by any node whose script names its own action).
    #[must_use]
    pub fn with_action(next_input: Value, action: impl Into<String>) -> Self {
        Self { next_input, action: action.into() }
    }
}

/// How a `join` node merges the values its paired `split`'s branches
/// arrive with. Exposed as a [`Node`] method rather than recovered by
/// downcasting so `flowrunner-engine` can read it through the trait
/// object it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinFormat {
    /// Merge branch outputs into an object keyed by branch action label.
    Object,
    /// Collect branch outputs into an array, in branch-declaration order.
    Array,
}

/// The three-phase lifecycle every node instance implements.
///
/// `prep` and `post` are expected to be cheap and non-suspending beyond
/// evaluating templates/scripts; `exec` is the one phase the retry
/// policy applies to and the one phase expected to suspend on I/O.
#[async_trait]
pub trait Node: Send + Sync {
    /// Resolve this node's templated params against `ctx` and build the
    /// input the `exec` phase will run against. A failure here is fatal
    /// for the node — never retried.
    async fn prep(&self, ctx: &ExecutionContext, node_id: &str, input: Value) -> Result<PreparedNode, NodeError>;

    /// Perform the node's actual work. May suspend on I/O. Subject to
    /// the descriptor's retry policy.
    async fn exec(&self, ctx: &ExecutionContext, prepared: &PreparedNode) -> Result<Value, NodeError>;

    /// Decide the outgoing action and the value the successor should
    /// receive. Never retried.
    async fn post(
        &self,
        ctx: &ExecutionContext,
        prepared: &PreparedNode,
        result: Value,
    ) -> Result<NodePost, NodeError>;

    /// The `shared["<family>_result"]` alias this node family writes in
    /// addition to `shared["<node_id>_result"]` and `shared["result"]`,
    /// per SPEC_FULL.md §3's node-result alias set. `None` for node
    /// types with no declared family slot.
    fn result_family(&self) -> Option<&'static str> {
        None
    }

    /// The merge shape a `join`-typed node wants its arrivals collected
    /// into. Only meaningful for nodes the interpreter dispatches as a
    /// graph join (`descriptor.node_type == "join"`); every other node
    /// type leaves the default.
    fn join_format(&self) -> JoinFormat {
        JoinFormat::Object
    }
}
