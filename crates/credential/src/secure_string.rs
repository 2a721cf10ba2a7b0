//! A string that redacts itself and zeroizes its backing memory on drop.

use std::fmt;

use zeroize::Zeroize;

/// Holds a decrypted secret value. `Debug` and `Display` never print the
/// contents; only [`SecureString::expose`] reaches the plaintext, and
/// callers should hold the result no longer than the single
/// substitution or script evaluation that needs it.
#[derive(Clone)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self { inner: value.into() }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
