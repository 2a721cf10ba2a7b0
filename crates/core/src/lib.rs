//! Core types shared across every FlowRunner crate.
//!
//! Provides typed identifiers (`AccountId`, `FlowId`, `ExecutionId`,
//! `NodeId`) and the `ScopeLevel` hierarchy used to bound state and
//! capabilities to the right part of a multi-tenant execution.

pub mod error;
pub mod id;
pub mod scope;

pub use error::CoreError;
pub use id::{AccountId, ExecutionId, FlowId, NodeId, UuidParseError};
pub use scope::ScopeLevel;

/// Result type used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
