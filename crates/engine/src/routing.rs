//! Action → successor resolution.
//!
//! Ordinary routing is exact-label-then-`default`, already implemented
//! once by `NodeDescriptor::successor_for` — this module only adds the
//! two cases that deviate from it: an `error` edge is looked up by
//! exact label alone (never falls back to `default`, so a node with
//! only a `default` successor genuinely fails the execution on
//! exhausted retries rather than silently continuing down the happy
//! path), and a `timeout` action (currently only the batch family
//! emits it, per spec.md §4.E) falls through to that same exact-only
//! `error` lookup when no exact `timeout` edge exists, rather than to
//! the generic default-fallback a normal custom action would get.

use flowrunner_workflow::{NodeDescriptor, NodeKey, ERROR_ACTION};

/// Where a node's outcome routes to next.
#[derive(Debug, Clone)]
pub enum RouteDecision {
    /// Proceed to this successor with the given input.
    Successor(NodeKey),
    /// No successor resolves; the node is a dead end and the execution
    /// that reaches it completes successfully.
    Terminal,
    /// No successor resolves and the failure is not recoverable by the
    /// graph; the execution fails with this summary.
    Failed(String),
}

/// Route a successful `post` outcome: exact action label, falling back
/// to `default`.
#[must_use]
pub fn route_action(descriptor: &NodeDescriptor, action: &str) -> RouteDecision {
    match descriptor.successor_for(action) {
        Some(next) => RouteDecision::Successor(next.clone()),
        None => RouteDecision::Terminal,
    }
}

/// Route an `exec` failure with no attempts remaining: an exact
/// `error` edge, or execution failure.
#[must_use]
pub fn route_error(descriptor: &NodeDescriptor, message: impl Into<String>) -> RouteDecision {
    match descriptor.successors.get(ERROR_ACTION) {
        Some(next) => RouteDecision::Successor(next.clone()),
        None => RouteDecision::Failed(message.into()),
    }
}

/// Route a `post` outcome whose action is `"timeout"`: an exact
/// `timeout` edge if the descriptor declares one, else the same
/// exact-only `error` fallback `route_error` uses.
#[must_use]
pub fn route_timeout(descriptor: &NodeDescriptor) -> RouteDecision {
    match descriptor.successors.get("timeout") {
        Some(next) => RouteDecision::Successor(next.clone()),
        None => route_error(descriptor, format!("node {:?} timed out with no timeout or error edge", descriptor.id)),
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Map;

    use super::*;
    use flowrunner_workflow::RetryPolicy;

    fn descriptor(successors: &[(&str, &str)]) -> NodeDescriptor {
        let mut map = IndexMap::new();
        for (action, target) in successors {
            map.insert((*action).to_string(), NodeKey::from(*target));
        }
        NodeDescriptor {
            id: NodeKey::from("n"),
            node_type: "transform".to_string(),
            params: Map::new(),
            retry: RetryPolicy::none(),
            batch: None,
            successors: map,
        }
    }

    #[test]
    fn route_action_falls_back_to_default() {
        let d = descriptor(&[("default", "b")]);
        assert!(matches!(route_action(&d, "success"), RouteDecision::Successor(k) if k.as_ref() == "b"));
    }

    #[test]
    fn route_action_with_no_match_is_terminal() {
        let d = descriptor(&[]);
        assert!(matches!(route_action(&d, "success"), RouteDecision::Terminal));
    }

    #[test]
    fn route_error_ignores_default_fallback() {
        let d = descriptor(&[("default", "b")]);
        assert!(matches!(route_error(&d, "boom"), RouteDecision::Failed(msg) if msg == "boom"));
    }

    #[test]
    fn route_error_uses_exact_error_edge() {
        let d = descriptor(&[("default", "b"), ("error", "handler")]);
        assert!(matches!(route_error(&d, "boom"), RouteDecision::Successor(k) if k.as_ref() == "handler"));
    }

    #[test]
    fn route_timeout_prefers_exact_timeout_edge_over_default() {
        let d = descriptor(&[("default", "b"), ("timeout", "slow_path")]);
        assert!(matches!(route_timeout(&d), RouteDecision::Successor(k) if k.as_ref() == "slow_path"));
    }

    #[test]
    fn route_timeout_without_a_timeout_edge_falls_through_to_error_edge() {
        let d = descriptor(&[("default", "b"), ("error", "handler")]);
        assert!(matches!(route_timeout(&d), RouteDecision::Successor(k) if k.as_ref() == "handler"));
    }

    #[test]
    fn route_timeout_without_any_edge_fails() {
        let d = descriptor(&[("default", "b")]);
        assert!(matches!(route_timeout(&d), RouteDecision::Failed(_)));
    }
}
