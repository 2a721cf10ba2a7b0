//! Node-local failure, surfaced to the interpreter's retry/error-edge
//! logic.

use thiserror::Error;

/// An error raised from any of a node's three lifecycle phases.
///
/// Unlike the richer retryable/fatal taxonomy some action frameworks
/// use, retry eligibility here is decided entirely by the descriptor's
/// [`flowrunner_workflow::RetryPolicy`] attempt count — every `exec`
/// failure is equally retryable until attempts are exhausted, so the
/// error itself carries no retry hint.
#[derive(Debug, Error)]
pub enum NodeError {
    /// `prep` failed: template/script evaluation error, or a malformed
    /// parameter. Fatal for the node — never retried.
    #[error("prep failed: {0}")]
    Prep(String),

    /// `exec` failed: the underlying operation (HTTP call, LLM call,
    /// SMTP/IMAP round trip, script execution) errored. Subject to the
    /// node's retry policy.
    #[error("exec failed: {0}")]
    Exec(String),

    /// Cooperative cancellation observed at a suspension point.
    #[error("cancelled")]
    Cancelled,

    /// `exec` panicked. The interpreter runs every node's `exec` phase
    /// on its own task specifically to catch this and turn it into an
    /// ordinary node failure rather than unwinding into the execution's
    /// supervising task.
    #[error("exec panicked: {0}")]
    Panicked(String),
}

impl NodeError {
    pub fn prep(msg: impl Into<String>) -> Self {
        Self::Prep(msg.into())
    }

    pub fn exec(msg: impl Into<String>) -> Self {
        Self::Exec(msg.into())
    }
}

impl From<flowrunner_expression::ExpressionError> for NodeError {
    fn from(err: flowrunner_expression::ExpressionError) -> Self {
        Self::Prep(err.to_string())
    }
}

/// Failure constructing a node instance from its descriptor's params.
#[derive(Debug, Error)]
pub enum NodeBuildError {
    /// No factory is registered under this node type tag.
    #[error("no node type registered under {0:?}")]
    UnknownType(String),

    /// A factory rejected the descriptor's params (missing/malformed field).
    #[error("invalid params for node type {node_type:?}: {reason}")]
    InvalidParams { node_type: String, reason: String },
}
