//! The write-through persistence port (spec.md §6 "Persisted state
//! layout"): `executions` (by execution_id, indexed by account_id) and
//! `execution_logs` (by execution_id, append-only).
//!
//! The concrete relational/wide-column adapters are out of scope for
//! this crate (spec.md §1) — this trait is the seam a real deployment
//! implements against. [`InMemoryStore`] is the reference
//! implementation used by tests and by a single-process deployment
//! with no durability requirement.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowrunner_core::{AccountId, ExecutionId};
use flowrunner_execution::{ExecutionRecord, LogEntry};

/// Write-through store for execution records and their log streams.
///
/// Per spec.md §4.F: the manager writes through on every transition
/// and every log entry, but never reads from the store for an
/// execution that is currently in-flight — the in-memory view is
/// authoritative there. This trait only needs to serve cold reads
/// (status/log queries for ids the manager no longer holds in memory)
/// and durable writes.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn save_execution(&self, record: ExecutionRecord);
    async fn load_execution(&self, execution_id: ExecutionId) -> Option<ExecutionRecord>;
    async fn list_by_account(&self, account_id: AccountId) -> Vec<ExecutionRecord>;
    async fn append_log(&self, entry: LogEntry);
    async fn load_logs(&self, execution_id: ExecutionId) -> Vec<LogEntry>;
}

/// An in-process store backed by [`dashmap`]. Nothing here survives a
/// process restart — durable storage is a pluggable concern the REST
/// surface's relational/wide-column adapters own (spec.md §1).
#[derive(Default)]
pub struct InMemoryStore {
    executions: DashMap<ExecutionId, ExecutionRecord>,
    logs: DashMap<ExecutionId, Vec<LogEntry>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn save_execution(&self, record: ExecutionRecord) {
        self.executions.insert(record.execution_id, record);
    }

    async fn load_execution(&self, execution_id: ExecutionId) -> Option<ExecutionRecord> {
        self.executions.get(&execution_id).map(|entry| entry.clone())
    }

    async fn list_by_account(&self, account_id: AccountId) -> Vec<ExecutionRecord> {
        self.executions
            .iter()
            .filter(|entry| entry.account_id == account_id)
            .map(|entry| entry.clone())
            .collect()
    }

    async fn append_log(&self, entry: LogEntry) {
        self.logs.entry(entry.execution_id).or_default().push(entry);
    }

    async fn load_logs(&self, execution_id: ExecutionId) -> Vec<LogEntry> {
        self.logs.get(&execution_id).map(|entry| entry.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrunner_core::FlowId;
    use flowrunner_execution::LogLevel;

    #[tokio::test]
    async fn saves_and_loads_an_execution_by_id() {
        let store = InMemoryStore::new();
        let record = ExecutionRecord::new(ExecutionId::v4(), AccountId::v4(), FlowId::v4());
        let id = record.execution_id;
        store.save_execution(record).await;
        assert!(store.load_execution(id).await.is_some());
    }

    #[tokio::test]
    async fn unknown_execution_loads_as_none() {
        let store = InMemoryStore::new();
        assert!(store.load_execution(ExecutionId::v4()).await.is_none());
    }

    #[tokio::test]
    async fn lists_only_the_requested_accounts_executions() {
        let store = InMemoryStore::new();
        let account_a = AccountId::v4();
        let account_b = AccountId::v4();
        store.save_execution(ExecutionRecord::new(ExecutionId::v4(), account_a, FlowId::v4())).await;
        store.save_execution(ExecutionRecord::new(ExecutionId::v4(), account_b, FlowId::v4())).await;

        let for_a = store.list_by_account(account_a).await;
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].account_id, account_a);
    }

    #[tokio::test]
    async fn logs_append_in_order_per_execution() {
        let store = InMemoryStore::new();
        let execution_id = ExecutionId::v4();
        store.append_log(LogEntry::new(execution_id, LogLevel::Info, "first")).await;
        store.append_log(LogEntry::new(execution_id, LogLevel::Info, "second")).await;

        let logs = store.load_logs(execution_id).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "first");
        assert_eq!(logs[1].message, "second");
    }
}
