//! Join rendezvous.
//!
//! `flowrunner-workflow` precomputes how many arrivals a `join` node
//! needs (`Graph::join_arrival_count`, from dominator analysis at
//! validation time) but does not track arrivals itself — that is
//! runtime state, not graph shape, so it belongs here. Every branch a
//! `split` spawns carries its own slot index (declaration order among
//! the split's non-`default` successors) and registers its value under
//! that slot when it reaches the paired join; the branch whose
//! registration fills the last empty slot becomes the one that runs
//! the join node's own lifecycle and continues the interpreter past
//! it, exactly as sketched for `flowrunner-engine` in DESIGN.md.
//!
//! Grounded on the teacher's `WorkflowEngine::resolve_node_input`,
//! which performs an analogous merge-by-predecessor directly inside
//! its level-by-level executor; this crate generalizes it into an
//! explicit, keyed rendezvous so branches can run fully concurrently
//! rather than level-synchronized.

use std::collections::HashMap;
use std::sync::Mutex;

use flowrunner_node::JoinFormat;
use flowrunner_workflow::NodeKey;
use serde_json::{Map, Value};

struct PendingJoin {
    /// `slots[i]` is the value branch `i` arrived with, or `None` if
    /// that branch hasn't arrived yet.
    slots: Vec<Option<(String, Value)>>,
    remaining: usize,
}

/// Per-execution join rendezvous state. One instance is shared across
/// every branch task an `Engine::run` call spawns.
#[derive(Default)]
pub struct JoinCoordinator {
    pending: Mutex<HashMap<NodeKey, PendingJoin>>,
}

impl JoinCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register branch `slot_index`'s (labeled `slot_label`) arrival
    /// value for `join_id`, which expects `expected` total arrivals.
    /// Returns the merged value, per `format`, once the last branch
    /// arrives — `None` for every earlier arrival.
    pub fn arrive(
        &self,
        join_id: &NodeKey,
        expected: usize,
        slot_index: usize,
        slot_label: &str,
        format: JoinFormat,
        value: Value,
    ) -> Option<Value> {
        let mut pending = self.pending.lock().expect("join coordinator mutex poisoned");
        let entry = pending.entry(join_id.clone()).or_insert_with(|| PendingJoin {
            slots: vec![None; expected],
            remaining: expected,
        });

        if slot_index < entry.slots.len() && entry.slots[slot_index].is_none() {
            entry.slots[slot_index] = Some((slot_label.to_string(), value));
            entry.remaining = entry.remaining.saturating_sub(1);
        }

        if entry.remaining != 0 {
            return None;
        }

        let PendingJoin { slots, .. } = pending.remove(join_id).expect("just inserted above");
        Some(merge(slots, format))
    }
}

fn merge(slots: Vec<Option<(String, Value)>>, format: JoinFormat) -> Value {
    match format {
        JoinFormat::Array => {
            Value::Array(slots.into_iter().map(|slot| slot.map_or(Value::Null, |(_, v)| v)).collect())
        }
        JoinFormat::Object => {
            let mut object = Map::new();
            for (label, value) in slots.into_iter().flatten() {
                object.insert(label, value);
            }
            Value::Object(object)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn returns_none_until_every_branch_arrives() {
        let coordinator = JoinCoordinator::new();
        let join_id = NodeKey::from("j");
        assert!(coordinator
            .arrive(&join_id, 2, 0, "a", JoinFormat::Array, json!(1))
            .is_none());
        let merged = coordinator.arrive(&join_id, 2, 1, "b", JoinFormat::Array, json!(2));
        assert_eq!(merged, Some(json!([1, 2])));
    }

    #[test]
    fn array_format_preserves_declaration_order_regardless_of_arrival_order() {
        let coordinator = JoinCoordinator::new();
        let join_id = NodeKey::from("j");
        assert!(coordinator
            .arrive(&join_id, 3, 2, "c", JoinFormat::Array, json!("C"))
            .is_none());
        assert!(coordinator
            .arrive(&join_id, 3, 0, "a", JoinFormat::Array, json!("A"))
            .is_none());
        let merged = coordinator.arrive(&join_id, 3, 1, "b", JoinFormat::Array, json!("B"));
        assert_eq!(merged, Some(json!(["A", "B", "C"])));
    }

    #[test]
    fn object_format_keys_by_branch_label() {
        let coordinator = JoinCoordinator::new();
        let join_id = NodeKey::from("j");
        assert!(coordinator
            .arrive(&join_id, 2, 0, "left", JoinFormat::Object, json!(1))
            .is_none());
        let merged = coordinator.arrive(&join_id, 2, 1, "right", JoinFormat::Object, json!(2));
        assert_eq!(merged, Some(json!({"left": 1, "right": 2})));
    }

    #[test]
    fn distinct_join_ids_never_share_state() {
        let coordinator = JoinCoordinator::new();
        let merged = coordinator.arrive(&NodeKey::from("j1"), 1, 0, "only", JoinFormat::Array, json!(42));
        assert_eq!(merged, Some(json!([42])));
        assert!(coordinator
            .arrive(&NodeKey::from("j2"), 2, 0, "only", JoinFormat::Array, json!(1))
            .is_none());
    }
}
