//! The execution's `shared` map as a single-writer actor.
//!
//! §4.D invariant 1 requires concurrent writes from parallel branches
//! (split, `parallel_batch`) to serialize. Rather than exposing a lock
//! to every node task, `shared` lives behind one actor task that drains
//! a command channel — callers never see a guard, so there is nothing
//! to hold across an `await` and nothing to deadlock on. `snapshot`
//! gives a script a point-in-time clone to read; `record_node_result`
//! is the only write path, and runs as one atomic step inside the
//! actor so a node's result slots are never observed half-written.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

const RESULT_KEY: &str = "result";

enum Command {
    Snapshot(oneshot::Sender<Value>),
    Get(String, oneshot::Sender<Option<Value>>),
    RecordNodeResult {
        node_id: String,
        family: Option<&'static str>,
        value: Value,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the running actor. Cheap to clone; every clone talks to
/// the same underlying map.
#[derive(Clone)]
pub struct SharedState {
    sender: mpsc::Sender<Command>,
}

impl SharedState {
    /// Spawn the actor task and return a handle to it.
    #[must_use]
    pub fn spawn() -> Self {
        Self::spawn_with(Map::new())
    }

    /// Spawn pre-seeded with an initial map, e.g. restored state.
    #[must_use]
    pub fn spawn_with(initial: Map<String, Value>) -> Self {
        let (sender, mut receiver) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut state = initial;
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Snapshot(reply) => {
                        let _ = reply.send(Value::Object(state.clone()));
                    }
                    Command::Get(key, reply) => {
                        let _ = reply.send(state.get(&key).cloned());
                    }
                    Command::RecordNodeResult { node_id, family, value, reply } => {
                        state.insert(format!("{node_id}_result"), value.clone());
                        state.insert(RESULT_KEY.to_string(), value.clone());
                        if let Some(family) = family {
                            state.insert(format!("{family}_result"), value);
                        }
                        let _ = reply.send(());
                    }
                }
            }
        });
        Self { sender }
    }

    /// A point-in-time clone of the whole `shared` object, for binding
    /// into an [`flowrunner_expression::EvaluationContext`] as `shared`.
    pub async fn snapshot(&self) -> Value {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.sender.send(Command::Snapshot(reply_tx)).await.is_err() {
            return Value::Object(Map::new());
        }
        reply_rx.await.unwrap_or(Value::Object(Map::new()))
    }

    /// A single key's current value, if present.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender.send(Command::Get(key.to_string(), reply_tx)).await.ok()?;
        reply_rx.await.ok().flatten()
    }

    /// Write a node's result into `shared["<node_id>_result"]`,
    /// `shared["result"]`, and — for node families that declare one —
    /// `shared["<family>_result"]` (e.g. `"llm"`, `"http"`). All three
    /// writes land in one atomic actor step.
    pub async fn record_node_result(&self, node_id: &str, family: Option<&'static str>, value: Value) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .sender
            .send(Command::RecordNodeResult {
                node_id: node_id.to_string(),
                family,
                value,
                reply: reply_tx,
            })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

/// Build a `HashMap<String, String>` view of the process environment,
/// for the `env` bucket `EvaluationContext` exposes.
#[must_use]
pub fn process_env_snapshot() -> HashMap<String, String> {
    std::env::vars().collect()
}
