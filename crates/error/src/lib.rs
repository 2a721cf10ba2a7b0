//! Shared error conventions.
//!
//! Every crate in this workspace defines its own `thiserror` enum for
//! its own failure modes; this crate only holds the handful of types
//! that need to be shared across crate boundaries so a caller doesn't
//! have to depend on every producer crate just to match on an inner
//! error it received through a trait object.

use std::fmt;

/// A type-erased error, used at boundaries (node factories, provider
/// traits) where the concrete error type would otherwise force every
/// implementor to depend on every other implementor's error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wraps an arbitrary `BoxError` with a short, stable context string.
///
/// Unlike `anyhow::Error`, this is meant to cross a public API
/// boundary inside a library crate: it carries a `context` field
/// callers can match on without downcasting.
#[derive(Debug)]
pub struct ContextError {
    context: &'static str,
    source: BoxError,
}

impl ContextError {
    /// Wrap `source` with a short static `context` label.
    pub fn new(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            context,
            source: source.into(),
        }
    }

    /// The static context label this error was tagged with.
    #[must_use]
    pub fn context(&self) -> &'static str {
        self.context
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.source)
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
