//! The immutable flow graph model: descriptors as authored, validation
//! into a walkable `Graph`, and the retry/batch policies attached to
//! individual nodes.
//!
//! This crate does not execute anything — see `flowrunner-engine` for
//! the interpreter that walks a `Graph`. It also does not parse YAML
//! itself; `FlowDescriptor` derives `serde::Deserialize` so a caller
//! can feed it through `serde_yaml::from_str` (or any other `serde`
//! format) and then call [`Graph::from_descriptor`].

mod descriptor;
mod error;
mod graph;
mod policy;
mod validate;

pub use descriptor::{
    FlowDescriptor, NodeDescriptor, NodeKey, DEFAULT_ACTION, ERROR_ACTION, SUCCESS_ACTION,
};
pub use error::GraphError;
pub use graph::Graph;
pub use policy::{Backoff, BatchPolicy, BatchStrategy, RetryPolicy};
