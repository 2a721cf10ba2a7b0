//! Shared test-only `ExecutionContext` builder used by builtin node tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flowrunner_core::{AccountId, ExecutionId};
use flowrunner_credential::{CredentialError, SecretResolver, SecureString};
use flowrunner_execution::{ExecutionContext, NullLogSink, SharedState};

struct EmptyResolver;

#[async_trait]
impl SecretResolver for EmptyResolver {
    async fn resolve(&self, _account_id: AccountId, _key: &str) -> Result<Option<SecureString>, CredentialError> {
        Ok(None)
    }
}

pub fn test_execution_context() -> ExecutionContext {
    ExecutionContext::new(
        ExecutionId::v4(),
        AccountId::v4(),
        SharedState::spawn(),
        Arc::new(EmptyResolver),
        Arc::new(HashMap::new()),
        Arc::new(NullLogSink),
    )
}
