//! Error types for the vault engine.
//!
//! Expected outcomes are values, not errors: a wrong password surfaces as
//! `Ok(false)` from `unlock`/`change_password`, an existing vault as
//! `Ok(false)` from `create`, and a missing or undecryptable note as
//! `Ok(None)` from `read`. The variants below cover everything else.
//!
//! Secret material never appears in error messages.

use thiserror::Error;

use crate::crypto::CryptoError;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by the vault engine.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Unlock was called but no vault file exists at the path.
    #[error("no vault file exists at the configured path")]
    Missing,

    /// A secret-consuming operation was called while the vault is locked.
    #[error("vault is locked")]
    Locked,

    /// Internal inconsistency that retrying will not fix: the salt sidecar
    /// disagrees with the vault metadata, a verify token or settings row is
    /// present but malformed, or a required singleton row is absent.
    #[error("vault is corrupt: {0}")]
    Corrupt(String),

    /// Password hashing exhausted resources.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Unrecovered page store, SQL, or I/O error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<bastion_db::DbError> for VaultError {
    fn from(err: bastion_db::DbError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::KeyDerivation(_) | CryptoError::InvalidKeySize(_) => {
                Self::KeyDerivation(err.to_string())
            }
            CryptoError::Encrypt | CryptoError::Decrypt => Self::Storage(err.to_string()),
        }
    }
}
