//! Runs a fallible operation against a [`flowrunner_workflow::RetryPolicy`],
//! sleeping the policy's computed backoff between attempts.
//!
//! The policy itself (attempt count, backoff shape) is authored data
//! that lives in `flowrunner-workflow` alongside the node descriptor it
//! came from; this crate is the imperative loop that actually spends
//! wall-clock time honoring it. Only a node's `exec` phase is retried —
//! `prep` and `post` run exactly once, per spec.

use std::future::Future;

use flowrunner_workflow::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a cancellable retry didn't produce a value.
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// Every attempt failed and the policy had no attempts left.
    Exhausted(E),
    /// The cancellation token fired while waiting for the next attempt
    /// or mid-attempt.
    Cancelled,
}

/// Run `operation` up to `policy.max_attempts` times, sleeping the
/// policy's backoff between failures. `operation` receives the
/// 1-indexed attempt number it's being called for.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.has_attempts_remaining(attempt) {
                    return Err(err);
                }
                let wait = policy.wait_before(attempt + 1);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after exec failure");
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                attempt += 1;
            }
        }
    }
}

/// Like [`retry`], but the wait between attempts (and the attempt
/// itself) is raced against `cancellation`. Used by the interpreter so
/// a cancelled execution doesn't keep sleeping through a node's backoff.
pub async fn retry_cancellable<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancellation: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryOutcome<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let outcome = tokio::select! {
            biased;
            () = cancellation.cancelled() => return Err(RetryOutcome::Cancelled),
            result = operation(attempt) => result,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.has_attempts_remaining(attempt) {
                    return Err(RetryOutcome::Exhausted(err));
                }
                let wait = policy.wait_before(attempt + 1);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after exec failure");
                if !wait.is_zero() {
                    tokio::select! {
                        biased;
                        () = cancellation.cancelled() => return Err(RetryOutcome::Cancelled),
                        () = tokio::time::sleep(wait) => {}
                    }
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use flowrunner_workflow::Backoff;

    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_wait: Duration::from_millis(1),
            backoff: Backoff::Linear,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retrying_when_first_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy(3), |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success_within_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { if attempt < 3 { Err("not yet") } else { Ok(7) } }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(&policy(2), |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;
        assert_eq!(result, Err("boom"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_during_backoff_short_circuits() {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let mut long_wait = policy(5);
        long_wait.initial_wait = Duration::from_secs(30);

        let handle = tokio::spawn(async move {
            retry_cancellable(&long_wait, &token_clone, |_attempt| async { Err::<u32, &str>("boom") }).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, Err(RetryOutcome::Cancelled)));
    }
}
