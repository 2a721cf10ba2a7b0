//! Per-execution pub/sub, Component G.
//!
//! Grounded on the teacher's `nebula-telemetry::event::EventBus`
//! (subscribe/emit/recv shape) but generalized from its single
//! `tokio::sync::broadcast` channel to one bounded `mpsc` channel per
//! subscriber: `broadcast` is fire-and-forget-lossy for every
//! subscriber at once (a lagging subscriber drops messages silently,
//! and there is no way to disconnect just that one subscriber without
//! dropping the others), which cannot express spec.md §4.G's
//! requirement that a slow subscriber is disconnected in isolation
//! while every responsive subscriber keeps receiving every event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::ExecutionEvent;

/// Default per-subscriber queue depth. Generous enough to absorb a
/// burst of node-completion logs between two polls of a subscriber's
/// receiver; a subscriber that falls behind by more than this is, by
/// spec.md §4.G's own definition, "slow" and gets disconnected.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    sender: mpsc::Sender<ExecutionEvent>,
}

/// Handle to one execution's live event stream.
///
/// Cheap to clone; every clone publishes to and reads the same
/// subscriber table. One bus is created per execution by
/// `flowrunner-manager` and discarded once the execution's `complete`
/// event has gone out.
#[derive(Clone)]
pub struct EventBus {
    subscribers: std::sync::Arc<Mutex<HashMap<u64, Subscriber>>>,
    next_id: std::sync::Arc<AtomicU64>,
    capacity: usize,
    /// The most recent `Status`/`Complete` event, handed to a
    /// subscriber that attaches mid-execution as its required initial
    /// snapshot (spec.md §4.G: "a subscriber added mid-execution
    /// receives a single initial status snapshot, then only
    /// subsequent events").
    last_status: std::sync::Arc<Mutex<Option<ExecutionEvent>>>,
    closed: std::sync::Arc<AtomicBool>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: std::sync::Arc::new(Mutex::new(HashMap::new())),
            next_id: std::sync::Arc::new(AtomicU64::new(0)),
            capacity,
            last_status: std::sync::Arc::new(Mutex::new(None)),
            closed: std::sync::Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach a new subscriber. If the execution already produced a
    /// status snapshot, it is delivered immediately as this
    /// subscription's first message. If the bus is already closed
    /// (the execution reached a terminal state before this call), the
    /// subscriber receives the stored `complete` event, if any, then
    /// the channel closes right away.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if let Some(snapshot) = self.last_status.lock().clone() {
            // A fresh, empty channel; this can only fail if capacity
            // was 0, which `.max(1)` above already prevents.
            let _ = sender.try_send(snapshot);
        }

        if self.closed.load(Ordering::Acquire) {
            // Don't register; the subscriber only ever sees the
            // snapshot just sent (if any) and then sees the channel
            // close when `sender` is dropped at the end of this scope.
            return Subscription { id, receiver };
        }

        self.subscribers.lock().insert(id, Subscriber { sender });
        Subscription { id, receiver }
    }

    /// Publish `event` to every live subscriber.
    ///
    /// A subscriber whose queue is full is disconnected: its entry is
    /// removed from the table and its sender dropped, which closes its
    /// receiver after whatever was already queued drains — this is the
    /// isolation spec.md §4.G requires ("a slow subscriber must not
    /// block other subscribers or the interpreter").
    pub fn emit(&self, event: ExecutionEvent) {
        if let ExecutionEvent::Status { .. } | ExecutionEvent::Complete { .. } = &event {
            *self.last_status.lock() = Some(event.clone());
        }

        let terminal = event.is_terminal();

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|id, subscriber| match subscriber.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(subscriber_id = id, "disconnecting slow subscriber: queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if terminal {
            // Dropping every remaining sender closes each receiver
            // once its queue drains, satisfying "the subscription is
            // closed" after the final event.
            subscribers.clear();
            drop(subscribers);
            self.closed.store(true, Ordering::Release);
        }
    }

    /// Whether this bus has already emitted its terminal `complete`
    /// event. A late `subscribe()` still works; it just receives the
    /// stored snapshot (if any) and closes immediately.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current live subscriber count, for tests and diagnostics.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's handle to an [`EventBus`]. Drop to unsubscribe
/// early (the WebSocket protocol's `unsubscribe` message, per
/// spec.md §6).
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<ExecutionEvent>,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once the bus has
    /// closed and every queued event has been drained.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrunner_core::{AccountId, ExecutionId, FlowId};
    use flowrunner_execution::ExecutionRecord;

    fn record(status: flowrunner_execution::ExecutionStatus) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(ExecutionId::v4(), AccountId::v4(), FlowId::v4());
        if status != flowrunner_execution::ExecutionStatus::Pending {
            record.transition_to(flowrunner_execution::ExecutionStatus::Running).unwrap();
        }
        if status != flowrunner_execution::ExecutionStatus::Pending
            && status != flowrunner_execution::ExecutionStatus::Running
        {
            record.transition_to(status).unwrap();
        }
        record
    }

    #[tokio::test]
    async fn subscriber_added_mid_execution_gets_one_initial_snapshot_then_only_new_events() {
        let bus = EventBus::new();
        let id = ExecutionId::v4();
        bus.emit(ExecutionEvent::status(id, record(flowrunner_execution::ExecutionStatus::Running)));

        let mut sub = bus.subscribe();
        let first = sub.recv().await.unwrap();
        assert!(matches!(first, ExecutionEvent::Status { .. }));

        bus.emit(ExecutionEvent::log(id, flowrunner_execution::LogEntry::new(id, flowrunner_execution::LogLevel::Info, "hi")));
        let second = sub.recv().await.unwrap();
        assert!(matches!(second, ExecutionEvent::Log { .. }));
    }

    #[tokio::test]
    async fn terminal_event_closes_every_subscription() {
        let bus = EventBus::new();
        let id = ExecutionId::v4();
        let mut sub = bus.subscribe();
        bus.emit(ExecutionEvent::complete(id, record(flowrunner_execution::ExecutionStatus::Completed)));

        let event = sub.recv().await.unwrap();
        assert!(event.is_terminal());
        assert!(sub.recv().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus.is_closed());
    }

    #[tokio::test]
    async fn a_blocked_subscriber_is_disconnected_without_stalling_others() {
        let bus = EventBus::with_capacity(1);
        let id = ExecutionId::v4();
        let blocked = bus.subscribe();
        let mut responsive = bus.subscribe();

        // Fill and overflow the blocked subscriber's single-slot queue
        // without ever reading from it.
        for _ in 0..5 {
            bus.emit(ExecutionEvent::log(id, flowrunner_execution::LogEntry::new(id, flowrunner_execution::LogLevel::Info, "x")));
        }

        assert_eq!(bus.subscriber_count(), 1);
        assert!(responsive.recv().await.is_some());
        drop(blocked);
    }

    #[tokio::test]
    async fn subscribing_after_close_still_delivers_the_final_snapshot_then_closes() {
        let bus = EventBus::new();
        let id = ExecutionId::v4();
        bus.emit(ExecutionEvent::complete(id, record(flowrunner_execution::ExecutionStatus::Failed)));

        let mut late = bus.subscribe();
        let event = late.recv().await.unwrap();
        assert!(event.is_terminal());
        assert!(late.recv().await.is_none());
    }
}
