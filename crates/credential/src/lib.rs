//! Account-scoped secret resolution for template substitution and
//! script evaluation.
//!
//! Secret CRUD and the account/authentication middleware that guards it
//! are the HTTP surface's job, not this crate's — see `apps/server`.
//! This crate only holds the read-only resolution path the expression
//! evaluator calls at `secrets.X` access time.

mod error;
mod resolver;
mod secure_string;
mod vault;

pub use error::CredentialError;
pub use resolver::SecretResolver;
pub use secure_string::SecureString;
pub use vault::{InMemoryVault, VaultCacheStats};
