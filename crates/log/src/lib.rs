//! Structured logging init for FlowRunner binaries and tests.
//!
//! Library crates should log through the re-exported `tracing` macros
//! and never initialize a subscriber themselves; only `apps/server`
//! (or a test's `#[ctor]`-style setup) calls [`init`].

pub use tracing::{debug, error, info, instrument, span, trace, warn, Level};

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, ANSI-colored lines. Default outside production.
    #[default]
    Pretty,
    /// Newline-delimited JSON, one object per event.
    Json,
}

/// Options controlling the process-wide subscriber built by [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directive used when `RUST_LOG` is unset.
    pub default_directive: String,
    /// Output encoding.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Errors that can occur while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LogInitError {
    /// A second call to [`init`] was attempted; tracing only allows one
    /// global subscriber per process.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Install the process-wide `tracing` subscriber.
///
/// Reads `RUST_LOG` if present, otherwise falls back to
/// `config.default_directive`. Returns [`LogInitError::AlreadyInitialized`]
/// if a subscriber was already set (e.g. a test harness already called
/// this), which callers can safely ignore.
pub fn init(config: &LogConfig) -> Result<(), LogInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer().with_target(true).with_ansi(true);
            registry.with(layer).try_init()
        }
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(true).with_current_span(true);
            registry.with(layer).try_init()
        }
    };

    result.map_err(|_| LogInitError::AlreadyInitialized)
}

/// Install a subscriber suitable for `#[test]` functions: pretty format,
/// `debug` default directive, failures to initialize (because another
/// test already did) are swallowed.
pub fn init_for_tests() {
    let _ = init(&LogConfig {
        default_directive: "debug".to_string(),
        format: LogFormat::Pretty,
    });
}
