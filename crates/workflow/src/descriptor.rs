//! The immutable, author-facing shape of a flow: nodes and their wiring.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::{BatchPolicy, RetryPolicy};

/// A node's identifier as written in the flow descriptor.
///
/// Distinct from `flowrunner_core::NodeId`, which identifies a single
/// invocation of a node within one execution. A `NodeKey` identifies a
/// position in the graph itself and is stable across executions.
pub type NodeKey = Arc<str>;

/// The reserved action label a node's successor is taken for when no
/// exact-label match exists.
pub const DEFAULT_ACTION: &str = "default";

/// The conventional "happy path" action label. When a node declares
/// both a `success` and a `default` successor, `success` wins once the
/// node actually emits `success`.
pub const SUCCESS_ACTION: &str = "success";

/// The conventional action label an `error` edge is wired under, paired
/// with `input.error` bound to the failure that triggered it.
pub const ERROR_ACTION: &str = "error";

/// One node as authored in the flow descriptor: its type, parameters,
/// and the action-labeled edges leaving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Stable identifier, unique within the graph.
    pub id: NodeKey,
    /// Which registered node type to instantiate (`"http.request"`,
    /// `"transform"`, `"split"`, ...).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Static parameters passed to the node; may contain `${...}`
    /// templates resolved at execution time.
    #[serde(default)]
    pub params: serde_json::Map<String, Value>,
    /// Applies only to this node's `exec` phase.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Present only on `batch`/`parallel_batch`/`worker_pool` nodes.
    #[serde(default)]
    pub batch: Option<BatchPolicy>,
    /// Action label → next node id. Order is preserved (`IndexMap`) so
    /// a `split` node's fan-out is deterministic.
    #[serde(default)]
    pub successors: IndexMap<String, NodeKey>,
}

impl NodeDescriptor {
    /// The successor for `action`, falling back to `default` when no
    /// exact label matches, and to `success`'s edge when the node
    /// declares both and emitted `success`.
    ///
    /// Mirrors the routing rule spec'd for the interpreter: exact label
    /// first, then `default`. `success` has no special resolution
    /// power here beyond being an exact label — the "takes precedence"
    /// rule only matters when a descriptor declares *both* `success`
    /// and `default` edges and the node emits `success`, which exact-
    /// match already satisfies.
    #[must_use]
    pub fn successor_for(&self, action: &str) -> Option<&NodeKey> {
        self.successors
            .get(action)
            .or_else(|| self.successors.get(DEFAULT_ACTION))
    }

    /// Non-`default` successor edges, in declaration order. This is the
    /// fan-out set for a `split` node and the arrival count a paired
    /// `join` must wait for.
    #[must_use]
    pub fn branch_successors(&self) -> impl Iterator<Item = (&str, &NodeKey)> {
        self.successors
            .iter()
            .filter(|(action, _)| action.as_str() != DEFAULT_ACTION)
            .map(|(action, key)| (action.as_str(), key))
    }
}

/// The flow descriptor: a named set of nodes plus the id of the entry
/// node. YAML parsing itself is a caller concern (`serde_yaml::from_str`
/// against this type works out of the box); this crate owns the graph
/// it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDescriptor {
    /// Human-facing name, not used for identity.
    pub name: String,
    /// Entry point. Must be a key of `nodes`.
    pub start: NodeKey,
    /// Every node in the flow, keyed by id.
    pub nodes: HashMap<NodeKey, NodeDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeKey::from(id),
            node_type: "transform".to_string(),
            params: serde_json::Map::new(),
            retry: RetryPolicy::none(),
            batch: None,
            successors: IndexMap::new(),
        }
    }

    #[test]
    fn successor_for_falls_back_to_default() {
        let mut n = node("a");
        n.successors.insert(DEFAULT_ACTION.to_string(), NodeKey::from("b"));
        assert_eq!(n.successor_for("nonexistent").map(|k| k.as_ref()), Some("b"));
    }

    #[test]
    fn successor_for_prefers_exact_label() {
        let mut n = node("a");
        n.successors.insert(DEFAULT_ACTION.to_string(), NodeKey::from("b"));
        n.successors.insert(SUCCESS_ACTION.to_string(), NodeKey::from("c"));
        assert_eq!(n.successor_for(SUCCESS_ACTION).map(|k| k.as_ref()), Some("c"));
    }

    #[test]
    fn branch_successors_excludes_default() {
        let mut n = node("split1");
        n.successors.insert("branch_a".to_string(), NodeKey::from("x"));
        n.successors.insert("branch_b".to_string(), NodeKey::from("y"));
        n.successors.insert(DEFAULT_ACTION.to_string(), NodeKey::from("join1"));
        let branches: Vec<_> = n.branch_successors().map(|(a, _)| a).collect();
        assert_eq!(branches, vec!["branch_a", "branch_b"]);
    }

    #[test]
    fn flow_descriptor_round_trips_through_yaml() {
        let yaml = r#"
name: example
start: a
nodes:
  a:
    type: transform
    successors:
      default: b
  b:
    type: transform
    successors: {}
"#;
        let parsed: FlowDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.start.as_ref(), "a");
        assert_eq!(parsed.nodes.len(), 2);
    }
}
