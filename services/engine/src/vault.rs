//! Broker credential boundary
//!
//! Credentials are held as opaque ciphertext. Plaintext exists only inside a
//! [`with_plaintext`] scope and never prints.
//!
//! The engine core never places orders, so nothing inside this crate
//! decrypts credentials. This module is the seam for an embedding execution
//! client: it supplies its own [`CredentialVault`] and reads broker secrets
//! through [`with_plaintext`] right before use.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("vault unavailable: {0}")]
    Unavailable(String),

    #[error("ciphertext rejected: {0}")]
    InvalidCiphertext(String),
}

/// Opaque blob produced by a vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext(Vec<u8>);

impl Ciphertext {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Decrypted secret. `Debug` is redacted and the type is not `Clone`.
pub struct Plaintext(String);

impl Plaintext {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Plaintext([REDACTED])")
    }
}

/// External encrypt/decrypt service
#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn encrypt(&self, plaintext: Plaintext) -> Result<Ciphertext, VaultError>;

    async fn decrypt(&self, ciphertext: &Ciphertext) -> Result<Plaintext, VaultError>;
}

/// Decrypt `ciphertext`, run `use_secret` on it and drop the plaintext
pub async fn with_plaintext<V, F, T>(
    vault: &V,
    ciphertext: &Ciphertext,
    use_secret: F,
) -> Result<T, VaultError>
where
    V: CredentialVault + ?Sized,
    F: FnOnce(&str) -> T,
{
    let plaintext = vault.decrypt(ciphertext).await?;
    Ok(use_secret(plaintext.expose_secret()))
}
