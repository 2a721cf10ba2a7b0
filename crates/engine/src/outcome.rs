//! What [`crate::Engine::run`] hands back once a flow execution
//! reaches a terminal state. The engine never writes this into an
//! `ExecutionRecord` itself — see `flowrunner-manager`, which owns
//! that record and decides how to fold this outcome into it.

use flowrunner_execution::ExecutionStatus;
use serde_json::Value;

/// The terminal result of one `Engine::run` call.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub status: ExecutionStatus,
    pub final_result: Option<Value>,
    pub error_summary: Option<String>,
}

impl EngineOutcome {
    #[must_use]
    pub fn completed(final_result: Value) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            final_result: Some(final_result),
            error_summary: None,
        }
    }

    #[must_use]
    pub fn failed(error_summary: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            final_result: None,
            error_summary: Some(error_summary.into()),
        }
    }

    #[must_use]
    pub fn canceled() -> Self {
        Self {
            status: ExecutionStatus::Canceled,
            final_result: None,
            error_summary: None,
        }
    }

    #[must_use]
    pub fn timed_out() -> Self {
        Self {
            status: ExecutionStatus::TimedOut,
            final_result: None,
            error_summary: Some("execution deadline elapsed".to_string()),
        }
    }
}
