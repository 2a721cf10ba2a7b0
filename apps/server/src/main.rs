//! FlowRunner's REST + WebSocket server binary: wires the engine,
//! node registry, secret vault, and execution manager into a single
//! process and exposes them over HTTP (spec.md §6).

mod config;
mod error;
mod routes;
mod state;
mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use flowrunner_credential::{InMemoryVault, SecretResolver};
use flowrunner_log::LogConfig;
use flowrunner_manager::{ExecutionManager, InMemoryStore};
use flowrunner_node::{register_defaults, NodeRegistry};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Cli, ServerConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let server_config = ServerConfig::load(&cli)?;

    let log_config = LogConfig { default_directive: "info".to_string(), format: server_config.log_format() };
    if let Err(err) = flowrunner_log::init(&log_config) {
        eprintln!("tracing subscriber already initialized: {err}");
    }

    let mut registry = NodeRegistry::new();
    register_defaults(&mut registry, "http://localhost:11434");

    let vault: Arc<dyn SecretResolver> = Arc::new(InMemoryVault::new(server_config.vault_master_key.as_bytes()));
    let store = InMemoryStore::shared();
    let manager = Arc::new(ExecutionManager::new(Arc::new(registry), vault, store));
    let state = AppState { manager };

    let app = Router::new()
        .route("/accounts/{account_id}/executions", post(routes::submit))
        .route("/executions/{execution_id}", get(routes::status))
        .route("/executions/{execution_id}/logs", get(routes::logs))
        .route("/executions/{execution_id}/cancel", post(routes::cancel))
        .route("/ws", get(ws::upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(server_config.bind_addr).await?;
    info!(addr = %server_config.bind_addr, "flowrunner-server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
