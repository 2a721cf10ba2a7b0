//! Shared error primitives used across the FlowRunner workspace.

use thiserror::Error;

/// Errors raised by core identifier parsing and scope resolution.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string was not a valid UUID when parsing a typed identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::id::UuidParseError),
}
