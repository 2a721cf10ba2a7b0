//! Turns a `FlowDescriptor` into a validated `Graph`.
//!
//! Three checks run in sequence: every successor reference resolves,
//! every node is reachable from `start`, and every `join` node has a
//! dominating `split` whose branch-edge count becomes the join's
//! required arrival count.

use std::collections::{HashMap, HashSet};

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use crate::descriptor::{FlowDescriptor, NodeDescriptor, NodeKey};
use crate::error::GraphError;
use crate::graph::Graph;

const SPLIT_TYPE: &str = "split";
const JOIN_TYPE: &str = "join";

pub fn validate(descriptor: FlowDescriptor) -> Result<Graph, GraphError> {
    let FlowDescriptor { name, start, nodes } = descriptor;

    if !nodes.contains_key(&start) {
        return Err(GraphError::UnknownStart(start));
    }

    for node in nodes.values() {
        check_batch_policy(node)?;
        if node.node_type == SPLIT_TYPE && node.branch_successors().next().is_none() {
            return Err(GraphError::EmptySplit(node.id.clone()));
        }
        for successor in node.successors.values() {
            if !nodes.contains_key(successor) {
                return Err(GraphError::UnknownSuccessor {
                    from: node.id.clone(),
                    to: successor.clone(),
                });
            }
        }
    }

    let (pg, index_of) = build_petgraph(&nodes);
    let start_index = index_of[&start];

    check_reachability(&pg, &index_of, start_index, &nodes)?;

    let doms = dominators::simple_fast(&pg, start_index);
    let join_arrival_counts = pair_joins_with_splits(&pg, &index_of, &doms, &nodes)?;

    Ok(Graph {
        name,
        start,
        nodes,
        join_arrival_counts,
    })
}

fn check_batch_policy(node: &NodeDescriptor) -> Result<(), GraphError> {
    if let Some(batch) = &node.batch {
        batch.validate().map_err(|reason| GraphError::InvalidBatchPolicy {
            node: node.id.clone(),
            reason,
        })?;
    }
    Ok(())
}

fn build_petgraph(
    nodes: &HashMap<NodeKey, NodeDescriptor>,
) -> (DiGraph<NodeKey, ()>, HashMap<NodeKey, NodeIndex>) {
    let mut pg = DiGraph::new();
    let mut index_of = HashMap::with_capacity(nodes.len());
    for id in nodes.keys() {
        index_of.insert(id.clone(), pg.add_node(id.clone()));
    }
    for node in nodes.values() {
        let from = index_of[&node.id];
        for successor in node.successors.values() {
            pg.add_edge(from, index_of[successor], ());
        }
    }
    (pg, index_of)
}

fn check_reachability(
    pg: &DiGraph<NodeKey, ()>,
    index_of: &HashMap<NodeKey, NodeIndex>,
    start_index: NodeIndex,
    nodes: &HashMap<NodeKey, NodeDescriptor>,
) -> Result<(), GraphError> {
    let mut dfs = Dfs::new(pg, start_index);
    let mut visited = HashSet::with_capacity(nodes.len());
    while let Some(idx) = dfs.next(pg) {
        visited.insert(idx);
    }
    for id in nodes.keys() {
        if !visited.contains(&index_of[id]) {
            return Err(GraphError::Unreachable(id.clone()));
        }
    }
    Ok(())
}

fn pair_joins_with_splits(
    pg: &DiGraph<NodeKey, ()>,
    index_of: &HashMap<NodeKey, NodeIndex>,
    doms: &Dominators<NodeIndex>,
    nodes: &HashMap<NodeKey, NodeDescriptor>,
) -> Result<HashMap<NodeKey, usize>, GraphError> {
    let mut counts = HashMap::new();
    for node in nodes.values().filter(|n| n.node_type == JOIN_TYPE) {
        let join_index = index_of[&node.id];
        let mut cursor = doms.immediate_dominator(join_index);
        let mut found = None;
        while let Some(candidate) = cursor {
            let candidate_id = &pg[candidate];
            let candidate_node = &nodes[candidate_id];
            if candidate_node.node_type == SPLIT_TYPE {
                found = Some(candidate_node);
                break;
            }
            cursor = doms.immediate_dominator(candidate);
        }
        match found {
            Some(split) => {
                let arrivals = split.branch_successors().count();
                counts.insert(node.id.clone(), arrivals);
            }
            None => return Err(GraphError::UnmatchedJoin(node.id.clone())),
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::Map;

    use super::*;
    use crate::policy::RetryPolicy;

    fn node(id: &str, node_type: &str, successors: &[(&str, &str)]) -> NodeDescriptor {
        let mut map = IndexMap::new();
        for (action, target) in successors {
            map.insert((*action).to_string(), NodeKey::from(*target));
        }
        NodeDescriptor {
            id: NodeKey::from(id),
            node_type: node_type.to_string(),
            params: Map::new(),
            retry: RetryPolicy::none(),
            batch: None,
            successors: map,
        }
    }

    fn descriptor(nodes: Vec<NodeDescriptor>, start: &str) -> FlowDescriptor {
        FlowDescriptor {
            name: "test".to_string(),
            start: NodeKey::from(start),
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }

    #[test]
    fn rejects_unknown_start() {
        let d = descriptor(vec![node("a", "transform", &[])], "nonexistent");
        assert_eq!(
            validate(d).unwrap_err(),
            GraphError::UnknownStart(NodeKey::from("nonexistent"))
        );
    }

    #[test]
    fn rejects_unknown_successor() {
        let d = descriptor(vec![node("a", "transform", &[("default", "missing")])], "a");
        assert_eq!(
            validate(d).unwrap_err(),
            GraphError::UnknownSuccessor {
                from: NodeKey::from("a"),
                to: NodeKey::from("missing"),
            }
        );
    }

    #[test]
    fn rejects_unreachable_node() {
        let d = descriptor(
            vec![node("a", "transform", &[]), node("b", "transform", &[])],
            "a",
        );
        assert_eq!(validate(d).unwrap_err(), GraphError::Unreachable(NodeKey::from("b")));
    }

    #[test]
    fn rejects_empty_split() {
        let d = descriptor(vec![node("a", "split", &[])], "a");
        assert_eq!(validate(d).unwrap_err(), GraphError::EmptySplit(NodeKey::from("a")));
    }

    #[test]
    fn rejects_lone_join() {
        let d = descriptor(
            vec![node("a", "transform", &[("default", "j")]), node("j", "join", &[])],
            "a",
        );
        assert_eq!(validate(d).unwrap_err(), GraphError::UnmatchedJoin(NodeKey::from("j")));
    }

    #[test]
    fn pairs_split_with_join_and_counts_branches() {
        let d = descriptor(
            vec![
                node("s", "split", &[("branch_a", "x"), ("branch_b", "y")]),
                node("x", "transform", &[("default", "j")]),
                node("y", "transform", &[("default", "j")]),
                node("j", "join", &[]),
            ],
            "s",
        );
        let graph = validate(d).unwrap();
        assert_eq!(graph.join_arrival_count(&NodeKey::from("j")), Some(2));
    }

    #[test]
    fn nested_splits_pair_with_nearest_enclosing_split() {
        let d = descriptor(
            vec![
                node("outer", "split", &[("a", "inner"), ("b", "outer_j")]),
                node("inner", "split", &[("c", "x"), ("d", "y")]),
                node("x", "transform", &[("default", "inner_j")]),
                node("y", "transform", &[("default", "inner_j")]),
                node("inner_j", "join", &[("default", "outer_j")]),
                node("outer_j", "join", &[]),
            ],
            "outer",
        );
        let graph = validate(d).unwrap();
        assert_eq!(graph.join_arrival_count(&NodeKey::from("inner_j")), Some(2));
        assert_eq!(graph.join_arrival_count(&NodeKey::from("outer_j")), Some(2));
    }
}
