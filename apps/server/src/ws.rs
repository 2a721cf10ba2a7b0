//! The live subscription protocol from spec.md §6: a client opens one
//! WebSocket, then multiplexes `subscribe`/`unsubscribe`/`ping`
//! messages naming individual execution ids over it; the server
//! multiplexes `status`/`log`/`complete`/`error` events back the same
//! way.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use flowrunner_core::ExecutionId;
use flowrunner_eventbus::ExecutionEvent;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Subscribe { execution_id: String },
    Unsubscribe { execution_id: String },
    Ping,
}

/// Outbound channel depth for one client connection. Generous: this is
/// per-connection fan-in from every execution the client subscribed
/// to, not the per-execution backpressure `flowrunner-eventbus`
/// already enforces on the server side.
const OUTBOUND_CAPACITY: usize = 1024;

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut forwarders: HashMap<ExecutionId, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Text(text) = message else { continue };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Ping) => {
                let pong = json!({ "type": "pong", "timestamp": Utc::now() });
                if outbound_tx.send(Message::Text(pong.to_string().into())).await.is_err() {
                    break;
                }
            }
            Ok(ClientMessage::Subscribe { execution_id }) => {
                let Ok(execution_id) = ExecutionId::parse(&execution_id) else {
                    let err = json!({ "type": "error", "message": "invalid execution id" });
                    if outbound_tx.send(Message::Text(err.to_string().into())).await.is_err() {
                        break;
                    }
                    continue;
                };
                if forwarders.contains_key(&execution_id) {
                    continue;
                }
                match state.manager.subscribe(execution_id).await {
                    Some(mut subscription) => {
                        let tx = outbound_tx.clone();
                        let handle = tokio::spawn(async move {
                            while let Some(event) = subscription.recv().await {
                                let terminal = event.is_terminal();
                                let text = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                                if tx.send(Message::Text(text.into())).await.is_err() || terminal {
                                    break;
                                }
                            }
                        });
                        forwarders.insert(execution_id, handle);
                    }
                    None => {
                        let err = ExecutionEvent::error(execution_id, "execution not found");
                        let text = serde_json::to_string(&err).unwrap_or_else(|_| "{}".to_string());
                        if outbound_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(ClientMessage::Unsubscribe { execution_id }) => {
                if let Ok(execution_id) = ExecutionId::parse(&execution_id) {
                    if let Some(handle) = forwarders.remove(&execution_id) {
                        handle.abort();
                    }
                }
            }
            Err(_) => {
                let err = json!({ "type": "error", "message": "malformed subscription message" });
                if outbound_tx.send(Message::Text(err.to_string().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    for (_, handle) in forwarders {
        handle.abort();
    }
    drop(outbound_tx);
    let _ = writer.await;
}
