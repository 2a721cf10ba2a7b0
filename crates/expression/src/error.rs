//! Errors produced while parsing templates or evaluating expressions.

use thiserror::Error;

/// A byte-offset span into the source a parse or eval error occurred at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start offset, inclusive.
    pub start: usize,
    /// End offset, exclusive.
    pub end: usize,
}

impl Span {
    /// A span covering a single point, used when no range is known.
    #[must_use]
    pub fn point(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }
}

/// Failure evaluating a template or expression.
///
/// Callers (node implementations, the graph interpreter) decide whether
/// an `EvalError` is fatal for the node or should be surfaced as an
/// action — this type only carries what went wrong and where.
#[derive(Debug, Error)]
#[error("expression error at {span:?}: {cause}")]
pub struct EvalError {
    /// Where in the source the failure occurred.
    pub span: Span,
    /// Human-readable description of the failure.
    pub cause: String,
    /// Set when this error is specifically "a `secrets.X` reference had
    /// no matching value" — carries the key that was missing.
    ///
    /// Template substitution and script evaluation react to this
    /// differently (a template span substitutes an empty string and
    /// logs a warning; a script lets the error propagate as a throw),
    /// so the two call sites need to distinguish it from every other
    /// evaluation failure.
    pub unresolved_secret: Option<String>,
}

impl EvalError {
    /// Build an error with no useful span, for failures detected after
    /// parsing (e.g. a division by zero discovered mid-evaluation).
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            span: Span::default(),
            cause: cause.into(),
            unresolved_secret: None,
        }
    }

    /// Build an error anchored at a specific span.
    pub fn at(span: Span, cause: impl Into<String>) -> Self {
        Self {
            span,
            cause: cause.into(),
            unresolved_secret: None,
        }
    }

    /// Build the specific error for a `secrets.<key>` reference with no
    /// matching value.
    pub fn unresolved_secret(span: Span, key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            span,
            cause: format!("unresolved secret {key:?}"),
            unresolved_secret: Some(key),
        }
    }
}

/// Errors raised by the expression subsystem.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// The template or expression source could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// Parsing succeeded but evaluation against a context failed.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// A syntax error raised while tokenizing or parsing source text.
#[derive(Debug, Error)]
#[error("{message} (at offset {offset})")]
pub struct ParseError {
    /// Human-readable description.
    pub message: String,
    /// Byte offset the parser was at when it gave up.
    pub offset: usize,
}

impl ParseError {
    /// Build a parse error at the given offset.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Result alias used throughout this crate.
pub type ExpressionResult<T> = Result<T, ExpressionError>;
