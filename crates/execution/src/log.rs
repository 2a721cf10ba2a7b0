//! Append-only per-execution log entries.

use chrono::{DateTime, Utc};
use flowrunner_core::ExecutionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity of a log entry, mirroring the levels a node or the
/// interpreter itself may emit at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in an execution's append-only log stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub execution_id: ExecutionId,
    /// Absent for engine-level log lines not attributed to a node.
    pub node_id: Option<String>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(execution_id: ExecutionId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            execution_id,
            node_id: None,
            level,
            message: message.into(),
            data: Map::new(),
        }
    }

    #[must_use]
    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_set_optional_fields() {
        let entry = LogEntry::new(ExecutionId::v4(), LogLevel::Info, "node completed").for_node("n1");
        assert_eq!(entry.node_id.as_deref(), Some("n1"));
        assert_eq!(entry.level, LogLevel::Info);
    }

    #[test]
    fn engine_level_entries_have_no_node_id() {
        let entry = LogEntry::new(ExecutionId::v4(), LogLevel::Error, "graph validation failed");
        assert!(entry.node_id.is_none());
    }
}
