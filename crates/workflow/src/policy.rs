//! Per-node retry and batching policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the wait between retry attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Every attempt waits `initial_wait`.
    Linear,
    /// Attempt `n` (1-indexed, `n >= 2`; attempt 1 never waits) waits
    /// `initial_wait * 2^(n-2)` — the wait doubles with each retry
    /// beyond the first, rather than with each attempt overall.
    Exponential,
}

/// `{ max_attempts, initial_wait, backoff }`, applied only to `exec`
/// failures — never to `prep` or `post`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first. `0` or `1` means
    /// no retry.
    pub max_attempts: u32,
    /// Base wait before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_wait: Duration,
    /// Growth strategy for attempts after the first retry.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_wait: Duration::ZERO,
            backoff: Backoff::Linear,
        }
    }

    /// The wait before attempt `n` (1-indexed; attempt 1 never waits).
    #[must_use]
    pub fn wait_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Linear => self.initial_wait,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 2);
                self.initial_wait.saturating_mul(factor)
            }
        }
    }

    /// Whether a failing `exec` may be retried again given it has
    /// already been attempted `attempts_so_far` times.
    #[must_use]
    pub fn has_attempts_remaining(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// How a `batch`/`parallel_batch`/`worker_pool` node processes its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStrategy {
    /// One item at a time, in order.
    Sequential,
    /// Up to `max_parallel` items concurrently.
    Parallel,
    /// A fixed pool of `max_parallel` long-lived workers pulling from a queue.
    WorkerPool,
}

/// `{ strategy, max_parallel, batch_size }`, plus an optional
/// per-batch timeout for `parallel_batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Sequential, parallel, or worker-pool execution.
    pub strategy: BatchStrategy,
    /// Maximum concurrently in-flight items (ignored for `sequential`).
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Items grouped per chunk for `parallel_batch`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Optional wall-clock bound per batch.
    #[serde(default, with = "duration_millis_opt")]
    pub timeout: Option<Duration>,
}

fn default_max_parallel() -> usize {
    1
}

fn default_batch_size() -> usize {
    1
}

impl BatchPolicy {
    /// Validate the policy's invariants (`max_parallel >= 1`, `batch_size >= 1`).
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_parallel == 0 {
            return Err("batch policy max_parallel must be >= 1");
        }
        if self.batch_size == 0 {
            return Err("batch policy batch_size must be >= 1");
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod duration_millis_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_is_constant() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_wait: Duration::from_millis(100),
            backoff: Backoff::Linear,
        };
        assert_eq!(policy.wait_before(2), Duration::from_millis(100));
        assert_eq!(policy.wait_before(3), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_wait: Duration::from_millis(100),
            backoff: Backoff::Exponential,
        };
        assert_eq!(policy.wait_before(2), Duration::from_millis(100));
        assert_eq!(policy.wait_before(3), Duration::from_millis(200));
        assert_eq!(policy.wait_before(4), Duration::from_millis(400));
    }

    #[test]
    fn first_attempt_never_waits() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_wait: Duration::from_millis(50),
            backoff: Backoff::Exponential,
        };
        assert_eq!(policy.wait_before(1), Duration::ZERO);
    }

    #[test]
    fn attempts_remaining_respects_max() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::none()
        };
        assert!(policy.has_attempts_remaining(1));
        assert!(!policy.has_attempts_remaining(2));
    }

    #[test]
    fn batch_policy_rejects_zero_values() {
        let policy = BatchPolicy {
            strategy: BatchStrategy::Parallel,
            max_parallel: 0,
            batch_size: 1,
            timeout: None,
        };
        assert!(policy.validate().is_err());
    }
}
