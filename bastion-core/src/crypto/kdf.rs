//! Key derivation.
//!
//! `derive_master_key` -- Argon2id, turns the user password into the 32-byte
//! master key. The master key is never used directly; it is only input to
//! `derive_subkey`.
//!
//! `derive_subkey` -- HKDF-SHA256 under the fixed `"BastionX"` domain with a
//! 64-bit context tag, isolating key material per purpose (notes, settings,
//! verification, page store).

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use super::secret::SecretBuffer;
use super::CryptoError;

/// Salt size for Argon2id derivation.
pub const SALT_BYTES: usize = 16;

/// Master key and subkey size.
pub const KEY_BYTES: usize = 32;

/// KDF domain string. Exactly 8 bytes; part of the on-disk key hierarchy.
const KDF_DOMAIN: &[u8; 8] = b"BastionX";

/// Subkey context for note envelope encryption.
pub const SUBKEY_NOTES: u64 = 1;

/// Subkey context for settings encryption.
pub const SUBKEY_SETTINGS: u64 = 2;

/// Subkey context for the password verification token.
pub const SUBKEY_VERIFY: u64 = 3;

/// Subkey context for the page store file key.
pub const SUBKEY_DATABASE: u64 = 4;

/// Argon2id cost parameters.
///
/// Stored in the vault metadata alongside the salt so the tuning that
/// produced a vault remains inspectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Iteration count (Argon2 `t_cost`).
    pub opslimit: u64,
    /// Memory limit in bytes (Argon2 `m_cost` is this over 1024).
    pub memlimit: u64,
}

impl KdfParams {
    /// Interactive-desktop tuning: 100-500 ms on commodity hardware.
    pub const MODERATE: Self = Self {
        opslimit: 3,
        memlimit: 64 * 1024 * 1024,
    };
}

/// Result of master key derivation.
pub struct DerivedKey {
    /// 32-byte master key.
    pub master_key: SecretBuffer,
    /// The salt used; stored beside the vault, not secret.
    pub salt: [u8; SALT_BYTES],
}

/// Generates a fresh random 16-byte salt.
#[must_use]
pub fn generate_salt() -> [u8; SALT_BYTES] {
    let mut salt = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derives the master key from `password` with Argon2id.
///
/// When `salt` is `None` a fresh random salt is generated and returned with
/// the key; unlocking an existing vault passes the stored salt.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] when hashing fails, which in
/// practice means the memory limit could not be satisfied.
pub fn derive_master_key(
    password: &str,
    salt: Option<[u8; SALT_BYTES]>,
    params: KdfParams,
) -> Result<DerivedKey, CryptoError> {
    let salt = salt.unwrap_or_else(generate_salt);

    let m_cost_kib = u32::try_from(params.memlimit / 1024)
        .map_err(|_| CryptoError::KeyDerivation("memory limit out of range".to_string()))?;
    let t_cost = u32::try_from(params.opslimit)
        .map_err(|_| CryptoError::KeyDerivation("operation limit out of range".to_string()))?;
    let argon_params = Params::new(m_cost_kib, t_cost, 1, Some(KEY_BYTES))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut master_key = SecretBuffer::new(KEY_BYTES);
    argon2
        .hash_password_into(password.as_bytes(), &salt, master_key.as_mut_bytes())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey { master_key, salt })
}

/// Derives a 32-byte subkey from `master_key` for the given context.
///
/// Deterministic: the same master key and context always yield the same
/// subkey. Distinct contexts yield independent keys.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeySize`] when `master_key` is not 32 bytes.
pub fn derive_subkey(master_key: &SecretBuffer, context: u64) -> Result<SecretBuffer, CryptoError> {
    if master_key.len() != KEY_BYTES {
        return Err(CryptoError::InvalidKeySize(master_key.len()));
    }

    let mut info = [0u8; 16];
    info[..8].copy_from_slice(KDF_DOMAIN);
    info[8..].copy_from_slice(&context.to_le_bytes());

    let hk = Hkdf::<Sha256>::new(None, master_key.as_bytes());
    let mut subkey = SecretBuffer::new(KEY_BYTES);
    hk.expand(&info, subkey.as_mut_bytes())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(subkey)
}
