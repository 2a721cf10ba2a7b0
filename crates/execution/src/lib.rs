//! Per-execution state: the shared map, secret resolution scoped to
//! what a node actually references, cancellation, the status/progress
//! record, and the append-only log stream.
//!
//! This crate holds state, not behavior — see `flowrunner-engine` for
//! the interpreter that drives nodes through this context.

mod context;
mod log;
mod record;
mod shared_state;
mod status;

pub use context::{ExecutionContext, LogSink, NullLogSink};
pub use log::{LogEntry, LogLevel};
pub use record::{ExecutionRecord, TerminalTransitionError};
pub use shared_state::{process_env_snapshot, SharedState};
pub use status::ExecutionStatus;
