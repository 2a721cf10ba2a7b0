//! The validated, immutable graph an interpreter walks.

use std::collections::HashMap;

use crate::descriptor::{FlowDescriptor, NodeDescriptor, NodeKey};
use crate::error::GraphError;
use crate::validate;

/// A `FlowDescriptor` that has passed validation: every successor
/// reference resolves, every node is reachable from `start`, and every
/// `join` node carries its precomputed arrival count.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) name: String,
    pub(crate) start: NodeKey,
    pub(crate) nodes: HashMap<NodeKey, NodeDescriptor>,
    pub(crate) join_arrival_counts: HashMap<NodeKey, usize>,
}

impl Graph {
    /// Validate a descriptor into a graph. This is the only way to
    /// construct one — a `Graph` in hand is always valid.
    pub fn from_descriptor(descriptor: FlowDescriptor) -> Result<Self, GraphError> {
        validate::validate(descriptor)
    }

    /// The flow's human-facing name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entry node's id.
    #[must_use]
    pub fn start(&self) -> &NodeKey {
        &self.start
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeKey) -> Option<&NodeDescriptor> {
        self.nodes.get(id)
    }

    /// The node an action label routes to from `node_id`, honoring the
    /// exact-label-then-`default` fallback rule.
    #[must_use]
    pub fn successor(&self, node_id: &NodeKey, action: &str) -> Option<&NodeKey> {
        self.node(node_id)?.successor_for(action)
    }

    /// The number of branch arrivals a `join` node must collect before
    /// it fires, precomputed at validation time from its dominating
    /// `split`'s branch-edge count.
    #[must_use]
    pub fn join_arrival_count(&self, join_id: &NodeKey) -> Option<usize> {
        self.join_arrival_counts.get(join_id).copied()
    }

    /// All node ids in the graph, in no particular order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.keys()
    }

    /// Total node count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes. Never true for a validated
    /// graph, since `start` must name a present node, but provided for
    /// the usual `len`/`is_empty` pairing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Map;

    use super::*;
    use crate::policy::RetryPolicy;

    fn single_node_descriptor() -> FlowDescriptor {
        let node = NodeDescriptor {
            id: NodeKey::from("a"),
            node_type: "transform".to_string(),
            params: Map::new(),
            retry: RetryPolicy::none(),
            batch: None,
            successors: IndexMap::new(),
        };
        FlowDescriptor {
            name: "single".to_string(),
            start: NodeKey::from("a"),
            nodes: [(node.id.clone(), node)].into_iter().collect(),
        }
    }

    #[test]
    fn from_descriptor_builds_a_valid_graph() {
        let graph = Graph::from_descriptor(single_node_descriptor()).unwrap();
        assert_eq!(graph.start().as_ref(), "a");
        assert_eq!(graph.len(), 1);
        assert!(graph.node(&NodeKey::from("a")).is_some());
    }

    #[test]
    fn successor_falls_back_through_node_descriptor() {
        let mut descriptor = single_node_descriptor();
        descriptor
            .nodes
            .get_mut(&NodeKey::from("a"))
            .unwrap()
            .successors
            .insert("default".to_string(), NodeKey::from("a"));
        let graph = Graph::from_descriptor(descriptor).unwrap();
        assert_eq!(
            graph.successor(&NodeKey::from("a"), "anything").map(|k| k.as_ref()),
            Some("a")
        );
    }
}
