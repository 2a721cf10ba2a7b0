//! The execution record: the manager's exclusively-owned, mutable
//! status/progress/result fields for one submission.

use chrono::{DateTime, Utc};
use flowrunner_core::{AccountId, ExecutionId, FlowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::status::ExecutionStatus;

/// Attempted an illegal transition on a record.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot transition execution from {from} to {to}: {from} is terminal")]
pub struct TerminalTransitionError {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// Created in `pending` by the manager; nodes never write to this
/// directly — they return values and actions, and the interpreter
/// commits the resulting record mutation through the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub account_id: AccountId,
    pub flow_id: FlowId,
    pub status: ExecutionStatus,
    /// `0..=100`, advisory only.
    pub progress: u8,
    pub current_node_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
    pub final_result: Option<Value>,
}

impl ExecutionRecord {
    #[must_use]
    pub fn new(execution_id: ExecutionId, account_id: AccountId, flow_id: FlowId) -> Self {
        Self {
            execution_id,
            account_id,
            flow_id,
            status: ExecutionStatus::Pending,
            progress: 0,
            current_node_id: None,
            start_time: Utc::now(),
            end_time: None,
            error_summary: None,
            final_result: None,
        }
    }

    /// Move to `status`. Transitions out of a terminal status are
    /// rejected — terminal state is sticky. Reaching a terminal status
    /// stamps `end_time`.
    pub fn transition_to(&mut self, status: ExecutionStatus) -> Result<(), TerminalTransitionError> {
        if self.status.is_terminal() {
            return Err(TerminalTransitionError { from: self.status, to: status });
        }
        self.status = status;
        if status.is_terminal() {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    pub fn set_current_node(&mut self, node_id: impl Into<String>) {
        self.current_node_id = Some(node_id.into());
    }

    /// Record a failure and transition to `failed`. Idempotent w.r.t.
    /// terminal state: rejected the same way any other late transition is.
    pub fn fail(&mut self, error_summary: impl Into<String>) -> Result<(), TerminalTransitionError> {
        self.error_summary = Some(error_summary.into());
        self.transition_to(ExecutionStatus::Failed)
    }

    /// Record success with its final result and transition to `completed`.
    pub fn complete(&mut self, final_result: Value) -> Result<(), TerminalTransitionError> {
        self.final_result = Some(final_result);
        self.progress = 100;
        self.transition_to(ExecutionStatus::Completed)
    }
}
