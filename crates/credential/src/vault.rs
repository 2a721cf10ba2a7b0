//! An in-memory, AES-256-GCM-at-rest secret store.
//!
//! Ciphertext lives in the process; nothing here persists across
//! restarts. That's intentional — secret CRUD and durable secret
//! storage are the (out-of-scope) REST surface's job. This vault only
//! needs to hold what an account's executions actually resolve, and to
//! decrypt it lazily and cache the plaintext briefly so a flow with
//! many `secrets.X` references in one run doesn't re-decrypt the same
//! value on every node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use flowrunner_core::AccountId;
use moka::sync::Cache;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::CredentialError;
use crate::resolver::SecretResolver;
use crate::secure_string::SecureString;

const NONCE_LEN: usize = 12;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

struct EncryptedSecret {
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    account_id: AccountId,
    key: String,
}

/// Hit/miss counters for the decrypt cache, exposed for observability.
#[derive(Debug, Default)]
pub struct VaultCacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// An in-memory vault: encrypts on write, decrypts (and caches) on read.
pub struct InMemoryVault {
    cipher: Aes256Gcm,
    secrets: RwLock<HashMap<AccountId, HashMap<String, EncryptedSecret>>>,
    cache: Cache<CacheKey, SecureString>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryVault {
    /// Build a vault whose at-rest encryption key is derived from
    /// `master_key` (SHA-256 of arbitrary-length input material — a
    /// passphrase, a KMS-unwrapped key, whatever the deployment feeds
    /// in — folded down to the 32 bytes AES-256 needs).
    #[must_use]
    pub fn new(master_key: &[u8]) -> Self {
        Self::with_cache_ttl(master_key, DEFAULT_CACHE_TTL)
    }

    #[must_use]
    pub fn with_cache_ttl(master_key: &[u8], cache_ttl: Duration) -> Self {
        let derived = Sha256::digest(master_key);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&derived));
        Self {
            cipher,
            secrets: RwLock::new(HashMap::new()),
            cache: Cache::builder()
                .max_capacity(DEFAULT_CACHE_CAPACITY)
                .time_to_live(cache_ttl)
                .build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Store (or overwrite) a secret for an account. Invalidates any
    /// cached plaintext for this key so a subsequent resolve sees the
    /// new value rather than a stale cache hit.
    pub fn put(&self, account_id: AccountId, key: impl Into<String>, value: &str) -> Result<(), CredentialError> {
        let key = key.into();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, value.as_bytes())
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        self.cache.invalidate(&CacheKey { account_id, key: key.clone() });
        self.secrets
            .write()
            .entry(account_id)
            .or_default()
            .insert(key, EncryptedSecret { nonce: nonce_bytes, ciphertext });
        Ok(())
    }

    /// Remove a secret. A no-op if it was never set.
    pub fn remove(&self, account_id: AccountId, key: &str) {
        self.cache.invalidate(&CacheKey { account_id, key: key.to_string() });
        if let Some(account_secrets) = self.secrets.write().get_mut(&account_id) {
            account_secrets.remove(key);
        }
    }

    /// Snapshot of cache hit/miss counts since construction.
    #[must_use]
    pub fn cache_stats(&self) -> VaultCacheStats {
        VaultCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn decrypt(&self, secret: &EncryptedSecret) -> Result<SecureString, CredentialError> {
        let nonce = Nonce::from_slice(&secret.nonce);
        let plaintext = self
            .cipher
            .decrypt(nonce, secret.ciphertext.as_slice())
            .map_err(|e| CredentialError::Decryption(e.to_string()))?;
        let value = String::from_utf8(plaintext).map_err(|e| CredentialError::Decryption(e.to_string()))?;
        Ok(SecureString::new(value))
    }
}

#[async_trait]
impl SecretResolver for InMemoryVault {
    async fn resolve(
        &self,
        account_id: AccountId,
        key: &str,
    ) -> Result<Option<SecureString>, CredentialError> {
        let cache_key = CacheKey { account_id, key: key.to_string() };
        if let Some(cached) = self.cache.get(&cache_key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(cached));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let encrypted = {
            let secrets = self.secrets.read();
            match secrets.get(&account_id).and_then(|m| m.get(key)) {
                Some(secret) => Some((secret.nonce, secret.ciphertext.clone())),
                None => None,
            }
        };

        let Some((nonce, ciphertext)) = encrypted else {
            return Ok(None);
        };
        let decrypted = self.decrypt(&EncryptedSecret { nonce, ciphertext })?;
        self.cache.insert(cache_key, decrypted.clone());
        Ok(Some(decrypted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_resolves_a_secret() {
        let vault = InMemoryVault::new(b"test-master-key");
        let account = AccountId::v4();
        vault.put(account, "api_key", "sk-abc123").unwrap();

        let resolved = vault.resolve(account, "api_key").await.unwrap();
        assert_eq!(resolved.unwrap().expose(), "sk-abc123");
    }

    #[tokio::test]
    async fn unknown_key_resolves_to_none_not_error() {
        let vault = InMemoryVault::new(b"test-master-key");
        let account = AccountId::v4();
        let resolved = vault.resolve(account, "missing").await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn secrets_are_isolated_per_account() {
        let vault = InMemoryVault::new(b"test-master-key");
        let account_a = AccountId::v4();
        let account_b = AccountId::v4();
        vault.put(account_a, "api_key", "a-secret").unwrap();

        let resolved = vault.resolve(account_b, "api_key").await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn second_resolve_is_served_from_cache() {
        let vault = InMemoryVault::new(b"test-master-key");
        let account = AccountId::v4();
        vault.put(account, "api_key", "sk-abc123").unwrap();

        vault.resolve(account, "api_key").await.unwrap();
        vault.resolve(account, "api_key").await.unwrap();

        let stats = vault.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn remove_invalidates_the_value() {
        let vault = InMemoryVault::new(b"test-master-key");
        let account = AccountId::v4();
        vault.put(account, "api_key", "sk-abc123").unwrap();
        vault.remove(account, "api_key");

        let resolved = vault.resolve(account, "api_key").await.unwrap();
        assert!(resolved.is_none());
    }
}
