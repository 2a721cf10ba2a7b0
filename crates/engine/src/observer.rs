//! How the interpreter reports progress without touching an
//! `ExecutionRecord` directly — that record is owned exclusively by
//! `flowrunner-manager` (see `flowrunner_execution::ExecutionRecord`'s
//! own doc comment: "nodes never write to it directly"). The
//! interpreter only ever calls through this trait; the manager is the
//! one concrete implementation that turns these calls into record
//! mutations and eventbus publishes.

use async_trait::async_trait;

/// Lifecycle callbacks the interpreter fires while walking a flow.
#[async_trait]
pub trait EngineObserver: Send + Sync {
    /// A node's `prep` is about to run.
    async fn on_node_started(&self, node_id: &str);

    /// A node's `post` has produced its outcome. `progress_percent` is
    /// the node-count heuristic from spec.md §4.E/§9: advisory only,
    /// never a correctness property.
    async fn on_node_completed(&self, node_id: &str, progress_percent: u8);
}

/// An observer that does nothing, for tests and standalone runs that
/// don't need progress reporting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

#[async_trait]
impl EngineObserver for NullObserver {
    async fn on_node_started(&self, _node_id: &str) {}
    async fn on_node_completed(&self, _node_id: &str, _progress_percent: u8) {}
}
