//! Vault failure modes.

use thiserror::Error;

/// Errors a [`crate::SecretResolver`] implementation may surface.
///
/// Notably absent: "secret not found." An unknown key is not a vault
/// failure — it resolves to `Ok(None)`, and callers decide what that
/// means for them (template substitution treats it as an empty string
/// plus a warning; script evaluation treats it as a thrown error).
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The stored ciphertext failed to decrypt: wrong key, corrupted
    /// data, or a tampered authentication tag.
    #[error("failed to decrypt secret: {0}")]
    Decryption(String),

    /// The vault was asked to store a value but encryption failed.
    #[error("failed to encrypt secret: {0}")]
    Encryption(String),
}
