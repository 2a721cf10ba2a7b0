//! A flow, validated and with every node instance built once.
//!
//! Mirrors the teacher's own `node.rs` doc comment: node instances are
//! built once per graph load, not once per execution. `CompiledFlow`
//! is the thing that split out of that observation — a `Graph` plus
//! the `Arc<dyn Node>` for every id in it, ready to be handed to
//! `Engine::run` as many times as the flow is submitted.

use std::collections::HashMap;
use std::sync::Arc;

use flowrunner_node::{Node, NodeRegistry};
use flowrunner_workflow::{Graph, NodeKey};

use crate::error::EngineError;

#[derive(Clone)]
pub struct CompiledFlow {
    graph: Graph,
    nodes: HashMap<NodeKey, Arc<dyn Node>>,
}

impl CompiledFlow {
    /// Build one node instance per graph node via `registry`. Fails
    /// fast on the first node type the registry can't build.
    pub fn compile(graph: Graph, registry: &NodeRegistry) -> Result<Self, EngineError> {
        let mut nodes = HashMap::with_capacity(graph.len());
        for id in graph.node_ids() {
            let descriptor = graph
                .node(id)
                .ok_or_else(|| EngineError::MissingCompiledNode(id.clone()))?;
            nodes.insert(id.clone(), registry.build(descriptor)?);
        }
        Ok(Self { graph, nodes })
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn node(&self, id: &NodeKey) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Map;

    use super::*;
    use flowrunner_node::register_defaults;
    use flowrunner_workflow::{FlowDescriptor, NodeDescriptor, RetryPolicy};

    fn single_transform_graph() -> Graph {
        let mut params = Map::new();
        params.insert("script".to_string(), serde_json::json!("return input"));
        let node = NodeDescriptor {
            id: NodeKey::from("a"),
            node_type: "transform".to_string(),
            params,
            retry: RetryPolicy::none(),
            batch: None,
            successors: IndexMap::new(),
        };
        Graph::from_descriptor(FlowDescriptor {
            name: "single".to_string(),
            start: NodeKey::from("a"),
            nodes: [(node.id.clone(), node)].into_iter().collect(),
        })
        .unwrap()
    }

    #[test]
    fn compiles_every_node_in_the_graph() {
        let mut registry = NodeRegistry::new();
        register_defaults(&mut registry, "http://localhost:0");
        let flow = CompiledFlow::compile(single_transform_graph(), &registry).unwrap();
        assert!(flow.node(&NodeKey::from("a")).is_some());
    }

    #[test]
    fn fails_when_a_node_type_is_unregistered() {
        let registry = NodeRegistry::new();
        let err = CompiledFlow::compile(single_transform_graph(), &registry).unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));
    }
}
