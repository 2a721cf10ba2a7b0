//! The port trait the expression evaluator resolves `secrets.X` through.

use async_trait::async_trait;
use flowrunner_core::AccountId;

use crate::error::CredentialError;
use crate::secure_string::SecureString;

/// Account-scoped, read-only secret lookup.
///
/// The vault is read-only during execution: writes made through the
/// (out-of-scope) REST surface take effect only for executions started
/// after the write commits, never for one already in flight.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolve `key` for `account_id`.
    ///
    /// Returns `Ok(None)` for an unknown key — that is not a vault
    /// failure. Returns `Err` only when a value is present but
    /// couldn't be decrypted.
    async fn resolve(
        &self,
        account_id: AccountId,
        key: &str,
    ) -> Result<Option<SecureString>, CredentialError>;
}
