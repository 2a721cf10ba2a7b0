//! Maps a node-type tag (`"transform"`, `"http.request"`, ...) to a
//! factory that builds a node instance from its descriptor.
//!
//! Mirrors the teacher's `ActionRegistry`: a plain `HashMap<String,
//! Arc<dyn ...>>` populated at startup, read lock-free afterwards,
//! keyed by string tag rather than a typed id since node types are
//! named directly in the flow descriptor's YAML.

use std::collections::HashMap;
use std::sync::Arc;

use flowrunner_workflow::NodeDescriptor;
use tracing::{debug, warn};

use crate::error::NodeBuildError;
use crate::node::Node;

/// Builds a node instance from its descriptor. Registered once per
/// node-type tag; invoked once per graph node at graph-load time (node
/// instances, unlike executions, are not re-created per run).
pub type NodeFactory = Arc<dyn Fn(&NodeDescriptor) -> Result<Arc<dyn Node>, NodeBuildError> + Send + Sync>;

/// Where a registered factory came from. Plugins registered before a
/// built-in shadow it; see [`NodeRegistry::register_plugin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Builtin,
    Plugin,
}

struct Entry {
    factory: NodeFactory,
    origin: Origin,
}

/// Process-wide mapping from node-type tag to factory.
///
/// Writable only during server initialization (registration methods
/// take `&mut self`); reads (`build`) take `&self` and never block on
/// anything beyond a plain hash lookup.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Entry>,
}

impl NodeRegistry {
    /// An empty registry with no node types registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one of this crate's built-in node types. A plugin
    /// already registered under the same tag keeps priority — built-ins
    /// never override a plugin, only fill a gap the plugin didn't claim.
    pub fn register_builtin(&mut self, node_type: impl Into<String>, factory: NodeFactory) {
        let node_type = node_type.into();
        if self.factories.contains_key(&node_type) {
            debug!(node_type = %node_type, "built-in registration skipped, a plugin already claimed this type");
            return;
        }
        self.factories.insert(node_type, Entry { factory, origin: Origin::Builtin });
    }

    /// Register a user/plugin-supplied node type. Per SPEC_FULL.md
    /// §4.B, a plugin registered before a built-in of the same tag
    /// shadows it; a plugin registered after one logs the shadow and
    /// wins anyway (plugins always take priority over built-ins, since
    /// a deployment that bothered registering a replacement clearly
    /// wants it used).
    pub fn register_plugin(&mut self, node_type: impl Into<String>, factory: NodeFactory) {
        let node_type = node_type.into();
        if let Some(existing) = self.factories.get(&node_type) {
            if existing.origin == Origin::Builtin {
                warn!(node_type = %node_type, "plugin shadows a built-in node type");
            }
        }
        self.factories.insert(node_type, Entry { factory, origin: Origin::Plugin });
    }

    /// Whether a factory is registered under `node_type`.
    #[must_use]
    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Number of registered node types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build a node instance for `descriptor` using the factory
    /// registered under `descriptor.node_type`.
    pub fn build(&self, descriptor: &NodeDescriptor) -> Result<Arc<dyn Node>, NodeBuildError> {
        let entry = self
            .factories
            .get(&descriptor.node_type)
            .ok_or_else(|| NodeBuildError::UnknownType(descriptor.node_type.clone()))?;
        (entry.factory)(descriptor)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Map;

    use super::*;
    use crate::node::{NodePost, PreparedNode};
    use async_trait::async_trait;
    use flowrunner_execution::ExecutionContext;
    use flowrunner_workflow::{BatchPolicy, RetryPolicy};
    use serde_json::Value;

    use crate::error::NodeError;

    struct NoOp;

    #[async_trait]
    impl Node for NoOp {
        async fn prep(&self, _ctx: &ExecutionContext, _id: &str, input: Value) -> Result<PreparedNode, NodeError> {
            Ok(PreparedNode {
                params: Map::new(),
                input,
                eval_ctx: flowrunner_expression::EvaluationContext::new(),
            })
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

    fn descriptor(node_type: &str) -> NodeDescriptor {
        let _: Option<BatchPolicy> = None;
        NodeDescriptor {
            id: flowrunner_workflow::NodeKey::from("n1"),
            node_type: node_type.to_string(),
            params: Map::new(),
            retry: RetryPolicy::none(),
            batch: None,
            successors: IndexMap::new(),
        }
    }

    fn noop_factory() -> NodeFactory {
        Arc::new(|_descriptor: &NodeDescriptor| Ok(Arc::new(NoOp) as Arc<dyn Node>))
    }

    #[test]
    fn unknown_type_fails_to_build() {
        let registry = NodeRegistry::new();
        let err = registry.build(&descriptor("transform")).unwrap_err();
        assert!(matches!(err, NodeBuildError::UnknownType(t) if t == "transform"));
    }

    #[test]
    fn builtin_registers_and_builds() {
        let mut registry = NodeRegistry::new();
        registry.register_builtin("transform", noop_factory());
        assert!(registry.contains("transform"));
        assert!(registry.build(&descriptor("transform")).is_ok());
    }

    #[test]
    fn plugin_registered_first_shadows_a_later_builtin() {
        let mut registry = NodeRegistry::new();
        registry.register_plugin("transform", noop_factory());
        registry.register_builtin("transform", noop_factory());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn plugin_registered_after_builtin_still_wins() {
        let mut registry = NodeRegistry::new();
        registry.register_builtin("transform", noop_factory());
        registry.register_plugin("transform", noop_factory());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("transform"));
    }
}
