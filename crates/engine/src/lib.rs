//! The graph interpreter: lifecycle, action routing, retry, split/join,
//! batching, and cancellation. See [`Engine::run`].

mod compiled;
mod error;
mod interpreter;
mod join;
mod observer;
mod outcome;
mod routing;

pub use compiled::CompiledFlow;
pub use error::EngineError;
pub use interpreter::Engine;
pub use observer::{EngineObserver, NullObserver};
pub use outcome::EngineOutcome;
