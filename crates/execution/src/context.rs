//! The per-execution context: everything a node needs beyond its own
//! params — shared state, secret resolution, environment, cancellation,
//! deadline, and the log sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flowrunner_core::{AccountId, ExecutionId};
use flowrunner_credential::SecretResolver;
use flowrunner_expression::{scan_secret_references, ConsoleSink, EvaluationContext};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::log::{LogEntry, LogLevel};
use crate::shared_state::SharedState;

/// Sink nodes and the interpreter append [`LogEntry`] values to.
///
/// Kept as a trait rather than a concrete channel type so the manager
/// crate can wire it straight to an execution's append-only log store
/// without this crate knowing how that store works.
pub trait LogSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

/// A sink that discards everything, for tests and standalone evaluation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn record(&self, _entry: LogEntry) {}
}

/// Bridges `console.log` calls made from inside a script to the
/// execution's log sink, tagged with the node currently executing.
struct ConsoleToLog {
    execution_id: ExecutionId,
    node_id: String,
    sink: Arc<dyn LogSink>,
}

impl ConsoleSink for ConsoleToLog {
    fn log(&self, message: &str) {
        self.sink.record(
            LogEntry::new(self.execution_id, LogLevel::Info, message).for_node(self.node_id.clone()),
        );
    }
}

/// Everything a running execution shares across every node it visits.
///
/// One `ExecutionContext` is built per execution and handed to every
/// node task the interpreter spawns; `shared`, `cancellation` and the
/// log sink are the same handle everywhere, so a branch's writes and a
/// cancellation request are visible to every other branch immediately.
#[derive(Clone)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub account_id: AccountId,
    shared: SharedState,
    secrets: Arc<dyn SecretResolver>,
    env: Arc<HashMap<String, String>>,
    cancellation: CancellationToken,
    deadline: Option<Instant>,
    log_sink: Arc<dyn LogSink>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        account_id: AccountId,
        shared: SharedState,
        secrets: Arc<dyn SecretResolver>,
        env: Arc<HashMap<String, String>>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            execution_id,
            account_id,
            shared,
            secrets,
            env,
            cancellation: CancellationToken::new(),
            deadline: None,
            log_sink,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Request cancellation. Idempotent; every clone observes it.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Whether the execution-level deadline, if any, has elapsed.
    #[must_use]
    pub fn is_past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time remaining before the deadline, or `None` if there is none.
    #[must_use]
    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_sink.record(LogEntry::new(self.execution_id, level, message));
    }

    pub fn log_for_node(&self, node_id: &str, level: LogLevel, message: impl Into<String>) {
        self.log_sink
            .record(LogEntry::new(self.execution_id, level, message).for_node(node_id));
    }

    /// Build the [`EvaluationContext`] a single node's params/scripts
    /// should evaluate against.
    ///
    /// `sources` is every template/script string the node is about to
    /// evaluate; only the secret keys they actually reference are
    /// resolved, so a node that never touches `secrets.*` never causes
    /// a vault round trip and an account's full secret set is never
    /// materialized in memory at once.
    pub async fn build_evaluation_context(
        &self,
        node_id: &str,
        input: Value,
        sources: &[&str],
    ) -> Result<EvaluationContext, flowrunner_credential::CredentialError> {
        let shared = self.shared.snapshot().await;

        let mut referenced = std::collections::HashSet::new();
        for source in sources {
            referenced.extend(scan_secret_references(source));
        }

        let mut secrets = HashMap::with_capacity(referenced.len());
        for key in referenced {
            if let Some(value) = self.secrets.resolve(self.account_id, &key).await? {
                secrets.insert(key, value.expose().to_string());
            }
        }

        let console: Arc<dyn ConsoleSink> = Arc::new(ConsoleToLog {
            execution_id: self.execution_id,
            node_id: node_id.to_string(),
            sink: Arc::clone(&self.log_sink),
        });

        Ok(EvaluationContext::builder()
            .shared(shared)
            .input(input)
            .secrets(secrets)
            .env((*self.env).clone())
            .console(console)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowrunner_credential::{CredentialError, SecureString};
    use flowrunner_core::FlowId;
    use serde_json::json;

    struct FakeResolver;

    #[async_trait]
    impl SecretResolver for FakeResolver {
        async fn resolve(
            &self,
            _account_id: AccountId,
            key: &str,
        ) -> Result<Option<SecureString>, CredentialError> {
            Ok(match key {
                "api_key" => Some(SecureString::new("secret-value")),
                _ => None,
            })
        }
    }

    fn context() -> ExecutionContext {
        let _ = FlowId::v4();
        ExecutionContext::new(
            ExecutionId::v4(),
            AccountId::v4(),
            SharedState::spawn(),
            Arc::new(FakeResolver),
            Arc::new(HashMap::new()),
            Arc::new(NullLogSink),
        )
    }

    #[tokio::test]
    async fn only_referenced_secrets_are_resolved() {
        let ctx = context();
        let eval_ctx = ctx
            .build_evaluation_context("n1", json!(null), &["secrets.api_key"])
            .await
            .unwrap();
        assert_eq!(eval_ctx.resolve_secret("api_key").as_deref(), Some("secret-value"));
        assert_eq!(eval_ctx.resolve_secret("unused_key"), None);
    }

    #[tokio::test]
    async fn no_source_text_means_no_secrets_resolved() {
        let ctx = context();
        let eval_ctx = ctx.build_evaluation_context("n1", json!(null), &[]).await.unwrap();
        assert_eq!(eval_ctx.resolve_secret("api_key"), None);
    }

    #[tokio::test]
    async fn cancellation_is_visible_across_clones() {
        let ctx = context();
        let other = ctx.clone();
        ctx.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn deadline_in_the_past_is_already_elapsed() {
        let ctx = context().with_deadline(Instant::now() - Duration::from_secs(1));
        assert!(ctx.is_past_deadline());
        assert_eq!(ctx.time_remaining(), Some(Duration::ZERO));
    }
}
