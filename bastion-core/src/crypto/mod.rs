//! Cryptographic primitives for the vault engine.
//!
//! Pure functions plus the [`SecretBuffer`] container. The construction is
//! fixed by the on-disk format:
//!
//! - Argon2id for the password-derived master key (32 bytes, 16-byte salt)
//! - HKDF-SHA256 context-separated subkeys under the `"BastionX"` domain
//! - XChaCha20-Poly1305 AEAD with random 24-byte nonces and caller AAD

mod aead;
mod kdf;
mod secret;

pub use aead::{decrypt, encrypt, EncryptedData, NONCE_BYTES, TAG_BYTES};
pub use kdf::{
    derive_master_key, derive_subkey, generate_salt, DerivedKey, KdfParams, KEY_BYTES, SALT_BYTES,
    SUBKEY_DATABASE, SUBKEY_NOTES, SUBKEY_SETTINGS, SUBKEY_VERIFY,
};
pub use secret::SecretBuffer;

use thiserror::Error;

/// Errors raised by the crypto primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Password hashing failed, typically from resource exhaustion.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// A key of the wrong length was supplied where 32 bytes are required.
    #[error("invalid key size: expected {KEY_BYTES} bytes, got {0}")]
    InvalidKeySize(usize),

    /// AEAD encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// AEAD decryption failed: wrong key, tampered ciphertext, AAD mismatch,
    /// or truncation. Deliberately a single indistinguishable case.
    #[error("decryption failed")]
    Decrypt,
}
