//! Graph validation failures.

use thiserror::Error;

use crate::descriptor::NodeKey;

/// Why a `FlowDescriptor` failed to become a validated `Graph`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// `start` does not name a node present in `nodes`.
    #[error("start node {0:?} is not present in the graph")]
    UnknownStart(NodeKey),

    /// A node's successor map points at an id with no matching node.
    #[error("node {from:?} has a successor {to:?} with no matching node")]
    UnknownSuccessor { from: NodeKey, to: NodeKey },

    /// A node other than `start` is unreachable from `start`.
    #[error("node {0:?} is unreachable from the start node")]
    Unreachable(NodeKey),

    /// A `join`-typed node has no `split`-typed node dominating it.
    #[error("join node {0:?} has no matching split on any path to it")]
    UnmatchedJoin(NodeKey),

    /// A `split`-typed node has no non-`default` successor edges, so it
    /// would fan out to nothing.
    #[error("split node {0:?} has no branch successors")]
    EmptySplit(NodeKey),

    /// A node's batch policy failed its own internal validation.
    #[error("node {node:?} has an invalid batch policy: {reason}")]
    InvalidBatchPolicy { node: NodeKey, reason: &'static str },
}
