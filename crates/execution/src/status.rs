//! Execution-level status.

use serde::{Deserialize, Serialize};

/// The overall status of a flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Recorded by the manager, not yet handed to the interpreter.
    Pending,
    /// The interpreter is actively walking the graph.
    Running,
    /// Reached a terminal node on every branch; `final_result` is set.
    Completed,
    /// A node failed and no error edge consumed it.
    Failed,
    /// Cancellation was requested and honored.
    Canceled,
    /// The execution-level deadline elapsed before completion.
    TimedOut,
}

impl ExecutionStatus {
    /// Once terminal, a status never changes again for this execution.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled | Self::TimedOut)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_four_named_outcomes_are_terminal() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Canceled.is_terminal());
        assert!(ExecutionStatus::TimedOut.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn display_matches_the_state_names_the_api_reports() {
        assert_eq!(ExecutionStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(ExecutionStatus::Canceled.to_string(), "canceled");
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&ExecutionStatus::TimedOut).unwrap(), "\"timed_out\"");
    }
}
