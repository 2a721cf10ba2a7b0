//! Per-execution pub/sub fan-out to WebSocket subscribers, Component G.
//!
//! One [`EventBus`] per execution. `flowrunner-manager` emits a
//! [`ExecutionEvent`] on every status transition and log entry; this
//! crate only concerns itself with getting those events to whichever
//! subscribers are attached, isolating a slow one from the rest.

mod bus;
mod event;

pub use bus::{EventBus, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};
pub use event::ExecutionEvent;
