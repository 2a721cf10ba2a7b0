//! Component F: the execution manager. Registers submissions, assigns
//! execution ids, owns the exclusive mutable execution record, and
//! exposes status/log lookup, live subscription, and cancellation.
//!
//! This is the seam between the (out-of-scope) REST/WebSocket surface
//! and the graph interpreter in `flowrunner-engine` — `apps/server`
//! is the only thing downstream of this crate.

mod error;
mod manager;
mod store;

pub use error::ManagerError;
pub use manager::ExecutionManager;
pub use store::{ExecutionStore, InMemoryStore};
