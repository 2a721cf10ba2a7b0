//! Component F: the execution registry. Owns every in-flight
//! execution's mutable record exclusively — nodes never write to it
//! (spec.md §3); only this crate's [`ManagerObserver`]/[`ManagerLogSink`]
//! ever call `transition_to`/`set_progress`/etc.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use flowrunner_core::{AccountId, ExecutionId, FlowId};
use flowrunner_credential::SecretResolver;
use flowrunner_engine::{CompiledFlow, Engine, EngineObserver};
use flowrunner_eventbus::{EventBus, ExecutionEvent, Subscription};
use flowrunner_execution::{
    process_env_snapshot, ExecutionContext, ExecutionRecord, ExecutionStatus, LogEntry, LogSink,
};
use flowrunner_node::NodeRegistry;
use flowrunner_workflow::{FlowDescriptor, Graph};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tracing::warn;

use crate::error::ManagerError;
use crate::store::ExecutionStore;

/// Everything the manager keeps in memory for one execution while it
/// is running or has just finished. Never evicted within a process
/// lifetime: spec.md's Non-goals exclude durable resumption and
/// cross-process distribution, so there is no compaction boundary this
/// crate is required to observe; a deployment that needs bounded
/// memory prunes terminal entries on its own schedule (e.g. a sweep
/// keyed off `ExecutionRecord::end_time`) rather than this crate
/// guessing when a caller is done querying a finished execution.
struct InFlight {
    record: Arc<SyncMutex<ExecutionRecord>>,
    context: ExecutionContext,
    bus: EventBus,
    logs: Arc<SyncMutex<Vec<LogEntry>>>,
}

/// Bridges `EngineObserver` progress callbacks to the record this
/// execution owns, writing through to the store and publishing a
/// status event on every node completion.
struct ManagerObserver {
    execution_id: ExecutionId,
    record: Arc<SyncMutex<ExecutionRecord>>,
    bus: EventBus,
    store: Arc<dyn ExecutionStore>,
}

#[async_trait]
impl EngineObserver for ManagerObserver {
    async fn on_node_started(&self, node_id: &str) {
        self.record.lock().set_current_node(node_id);
    }

    async fn on_node_completed(&self, node_id: &str, progress_percent: u8) {
        let snapshot = {
            let mut guard = self.record.lock();
            guard.set_current_node(node_id);
            guard.set_progress(progress_percent);
            guard.clone()
        };
        self.store.save_execution(snapshot.clone()).await;
        self.bus.emit(ExecutionEvent::status(self.execution_id, snapshot));
    }
}

/// Bridges every node's/engine's [`LogEntry`] to the in-memory log
/// buffer a cold `logs()` call serves while in-flight, the write-
/// through store, and the live event bus.
struct ManagerLogSink {
    execution_id: ExecutionId,
    bus: EventBus,
    store: Arc<dyn ExecutionStore>,
    buffer: Arc<SyncMutex<Vec<LogEntry>>>,
}

impl LogSink for ManagerLogSink {
    fn record(&self, entry: LogEntry) {
        self.buffer.lock().push(entry.clone());
        self.bus.emit(ExecutionEvent::log(self.execution_id, entry.clone()));
        let store = Arc::clone(&self.store);
        tokio::spawn(async move { store.append_log(entry).await });
    }
}

/// Component F. One instance per process; shared across every
/// account's submissions.
pub struct ExecutionManager {
    registry: Arc<NodeRegistry>,
    secrets: Arc<dyn SecretResolver>,
    store: Arc<dyn ExecutionStore>,
    in_flight: Arc<DashMap<ExecutionId, InFlight>>,
    engine: Engine,
}

impl ExecutionManager {
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>, secrets: Arc<dyn SecretResolver>, store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            registry,
            secrets,
            store,
            in_flight: Arc::new(DashMap::new()),
            engine: Engine::new(),
        }
    }

    /// Validate `descriptor` into a graph, compile it, allocate an
    /// execution id, record `running`, and launch the interpreter on
    /// a background task. Returns the id immediately — the caller
    /// observes progress through [`Self::status`]/[`Self::subscribe`].
    ///
    /// A validation or build failure rejects the submission outright;
    /// per spec.md §7, no execution record is ever created for it.
    pub async fn start(
        &self,
        account_id: AccountId,
        flow_id: FlowId,
        descriptor: FlowDescriptor,
        input: Value,
        deadline: Option<Duration>,
    ) -> Result<ExecutionId, ManagerError> {
        let graph = Graph::from_descriptor(descriptor)?;
        let compiled = Arc::new(CompiledFlow::compile(graph, &self.registry)?);

        let execution_id = ExecutionId::v4();
        let record = Arc::new(SyncMutex::new(ExecutionRecord::new(execution_id, account_id, flow_id)));
        let bus = EventBus::new();
        let logs = Arc::new(SyncMutex::new(Vec::new()));

        let log_sink: Arc<dyn LogSink> = Arc::new(ManagerLogSink {
            execution_id,
            bus: bus.clone(),
            store: Arc::clone(&self.store),
            buffer: Arc::clone(&logs),
        });

        let env = Arc::new(process_env_snapshot());
        let mut context = ExecutionContext::new(
            execution_id,
            account_id,
            flowrunner_execution::SharedState::spawn(),
            Arc::clone(&self.secrets),
            env,
            log_sink,
        );
        if let Some(deadline) = deadline {
            context = context.with_deadline(Instant::now() + deadline);
        }

        self.in_flight.insert(
            execution_id,
            InFlight { record: Arc::clone(&record), context: context.clone(), bus: bus.clone(), logs: Arc::clone(&logs) },
        );

        {
            let mut guard = record.lock();
            guard
                .transition_to(ExecutionStatus::Running)
                .expect("a freshly created record is always pending, so this transition cannot fail");
        }
        let running_snapshot = record.lock().clone();
        self.store.save_execution(running_snapshot.clone()).await;
        bus.emit(ExecutionEvent::status(execution_id, running_snapshot));

        let observer: Arc<dyn EngineObserver> =
            Arc::new(ManagerObserver { execution_id, record: Arc::clone(&record), bus: bus.clone(), store: Arc::clone(&self.store) });

        let engine = self.engine;
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let outcome = engine.run(&compiled, context, input, &observer).await;
            let mut guard = record.lock();
            match outcome {
                Ok(outcome) => fold_outcome(&mut guard, outcome),
                Err(engine_err) => {
                    let _ = guard.fail(engine_err.to_string());
                }
            }
            let snapshot = guard.clone();
            drop(guard);
            store.save_execution(snapshot.clone()).await;
            bus.emit(ExecutionEvent::complete(execution_id, snapshot));
        });

        Ok(execution_id)
    }

    /// Current status snapshot. Authoritative in-memory view for an
    /// in-flight execution; falls back to the store otherwise.
    pub async fn status(&self, execution_id: ExecutionId) -> Option<ExecutionRecord> {
        if let Some(in_flight) = self.in_flight.get(&execution_id) {
            return Some(in_flight.record.lock().clone());
        }
        self.store.load_execution(execution_id).await
    }

    /// The persisted log history. Same in-memory-first, store-fallback
    /// rule as [`Self::status`].
    pub async fn logs(&self, execution_id: ExecutionId) -> Vec<LogEntry> {
        if let Some(in_flight) = self.in_flight.get(&execution_id) {
            return in_flight.logs.lock().clone();
        }
        self.store.load_logs(execution_id).await
    }

    /// Attach a live subscriber. For an id that has already gone
    /// cold, synthesizes a one-shot bus that delivers the stored
    /// terminal snapshot as its `complete` event and then closes —
    /// the same contract a subscriber that raced the real `complete`
    /// event would observe.
    pub async fn subscribe(&self, execution_id: ExecutionId) -> Option<Subscription> {
        if let Some(in_flight) = self.in_flight.get(&execution_id) {
            return Some(in_flight.bus.subscribe());
        }
        let record = self.store.load_execution(execution_id).await?;
        let bus = EventBus::new();
        bus.emit(ExecutionEvent::complete(execution_id, record));
        Some(bus.subscribe())
    }

    /// Request cancellation. Returns [`ManagerError::NotFound`] for an
    /// unknown id or one that has already reached a terminal status —
    /// spec.md §4.E: cancelling a terminal execution is a no-op
    /// reported as not-found, never a silent success.
    pub fn cancel(&self, execution_id: ExecutionId) -> Result<(), ManagerError> {
        let in_flight = self.in_flight.get(&execution_id).ok_or(ManagerError::NotFound(execution_id))?;
        if in_flight.record.lock().status.is_terminal() {
            return Err(ManagerError::NotFound(execution_id));
        }
        in_flight.context.cancel();
        Ok(())
    }

    /// Every execution this manager knows about for `account_id`,
    /// in-flight or cold. In-flight records are authoritative;
    /// anything the store alone knows about is appended after.
    pub async fn list_for_account(&self, account_id: AccountId) -> Vec<ExecutionRecord> {
        let mut seen = std::collections::HashSet::new();
        let mut out: Vec<ExecutionRecord> = Vec::new();
        for entry in self.in_flight.iter() {
            let record = entry.value().record.lock().clone();
            if record.account_id == account_id {
                seen.insert(record.execution_id);
                out.push(record);
            }
        }
        for record in self.store.list_by_account(account_id).await {
            if seen.insert(record.execution_id) {
                out.push(record);
            }
        }
        out
    }
}

/// Map an [`flowrunner_engine::EngineOutcome`] onto the record's
/// terminal transition. `TimedOut` needs its own branch since
/// `ExecutionRecord::fail` hardcodes `Failed` — everything else routes
/// through the record's own named transition helpers.
fn fold_outcome(record: &mut ExecutionRecord, outcome: flowrunner_engine::EngineOutcome) {
    match outcome.status {
        ExecutionStatus::Completed => {
            let _ = record.complete(outcome.final_result.unwrap_or(Value::Null));
        }
        ExecutionStatus::Failed => {
            let _ = record.fail(outcome.error_summary.unwrap_or_else(|| "execution failed".to_string()));
        }
        ExecutionStatus::Canceled => {
            let _ = record.transition_to(ExecutionStatus::Canceled);
        }
        ExecutionStatus::TimedOut => {
            record.error_summary = Some(outcome.error_summary.unwrap_or_else(|| "execution deadline elapsed".to_string()));
            let _ = record.transition_to(ExecutionStatus::TimedOut);
        }
        ExecutionStatus::Pending | ExecutionStatus::Running => {
            warn!("engine outcome reported a non-terminal status; treating as failed");
            let _ = record.fail("engine returned a non-terminal outcome");
        }
    }
}
