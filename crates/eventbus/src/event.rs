//! The wire shape of an execution's live event stream (spec.md §6
//! "Server events"): `status`, `log`, `complete`, `error`.

use chrono::{DateTime, Utc};
use flowrunner_core::ExecutionId;
use flowrunner_execution::{ExecutionRecord, LogEntry};
use serde::{Deserialize, Serialize};

/// One event a [`crate::EventBus`] fans out to its subscribers.
///
/// `Status` fires on every transition and once more for a subscriber
/// that attaches mid-execution; `Log` fires per log entry; `Complete`
/// fires exactly once, at the terminal transition, after which the
/// bus closes; `Error` reports a subscription-level failure (e.g. the
/// execution id doesn't exist) rather than anything about the
/// execution itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Status {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
        status: ExecutionRecord,
    },
    Log {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
        node_id: Option<String>,
        message: String,
        log: LogEntry,
    },
    Complete {
        execution_id: ExecutionId,
        timestamp: DateTime<Utc>,
        message: String,
        status: ExecutionRecord,
    },
    Error {
        execution_id: ExecutionId,
        message: String,
    },
}

impl ExecutionEvent {
    #[must_use]
    pub fn status(execution_id: ExecutionId, status: ExecutionRecord) -> Self {
        Self::Status { execution_id, timestamp: Utc::now(), status }
    }

    #[must_use]
    pub fn log(execution_id: ExecutionId, entry: LogEntry) -> Self {
        Self::Log {
            execution_id,
            timestamp: entry.timestamp,
            node_id: entry.node_id.clone(),
            message: entry.message.clone(),
            log: entry,
        }
    }

    #[must_use]
    pub fn complete(execution_id: ExecutionId, status: ExecutionRecord) -> Self {
        Self::Complete {
            execution_id,
            timestamp: Utc::now(),
            message: format!("execution finished with status {}", status.status),
            status,
        }
    }

    #[must_use]
    pub fn error(execution_id: ExecutionId, message: impl Into<String>) -> Self {
        Self::Error { execution_id, message: message.into() }
    }

    /// Whether this event is the terminal `complete` event — the last
    /// thing a subscriber ever sees before the bus closes.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}
