//! Failures [`crate::ExecutionManager`] can surface to a caller.

use flowrunner_core::ExecutionId;
use flowrunner_engine::EngineError;
use flowrunner_workflow::GraphError;
use thiserror::Error;

/// Spec.md §7: graph validation errors are raised at submission,
/// before the execution enters `running`, and the submission is
/// rejected outright — no execution record is ever created for it.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No execution with this id is known, either in-flight or in the
    /// store. Also returned by `cancel` for an id that exists but has
    /// already reached a terminal status — spec.md §4.E: "any attempt
    /// to cancel a terminal execution returns not-found."
    #[error("execution {0} not found")]
    NotFound(ExecutionId),

    /// The submitted flow descriptor failed graph validation.
    #[error("flow graph validation failed: {0}")]
    Validation(#[from] GraphError),

    /// The graph validated but a node instance could not be built from
    /// its descriptor (unregistered node type, malformed params the
    /// factory itself rejects).
    #[error("failed to build the flow for execution: {0}")]
    Build(#[from] EngineError),
}
