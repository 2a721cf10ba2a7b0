//! The [`Node`] trait, its lifecycle types, the [`NodeRegistry`], and
//! every built-in node-type implementation.

pub mod builtins;
mod error;
mod node;
mod registry;

pub use builtins::register_defaults;
pub use error::{NodeBuildError, NodeError};
pub use node::{JoinFormat, Node, NodePost, PreparedNode};
pub use registry::{NodeFactory, NodeRegistry};
