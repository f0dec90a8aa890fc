//! Authenticated encryption.
//!
//! XChaCha20-Poly1305 (IETF variant). Key: 32 bytes. Nonce: 24 random bytes
//! per call. Tag: 16 bytes appended to the ciphertext. The AAD binds a
//! ciphertext to its context (a note row id, or empty for singletons) without
//! being stored in the ciphertext itself.

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{KeyInit, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::secret::SecretBuffer;
use super::CryptoError;

/// Nonce size for XChaCha20-Poly1305.
pub const NONCE_BYTES: usize = 24;

/// Poly1305 tag size appended to every ciphertext.
pub const TAG_BYTES: usize = 16;

/// An AEAD envelope: random nonce plus ciphertext-with-tag.
#[derive(Debug, Clone)]
pub struct EncryptedData {
    /// 24-byte nonce generated at encryption time.
    pub nonce: [u8; NONCE_BYTES],
    /// Ciphertext followed by the 16-byte authentication tag.
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under `key`, binding `aad`.
///
/// A fresh random nonce is generated per call; nonces are never reused.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeySize`] for a key that is not 32 bytes and
/// [`CryptoError::Encrypt`] if the cipher fails.
pub fn encrypt(
    plaintext: &[u8],
    key: &SecretBuffer,
    aad: &[u8],
) -> Result<EncryptedData, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::InvalidKeySize(key.len()))?;

    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encrypt)?;

    Ok(EncryptedData { nonce, ciphertext })
}

/// Decrypts `encrypted` under `key`, verifying the tag and the `aad` binding.
///
/// # Errors
///
/// Every failure -- wrong key, tampered ciphertext, AAD mismatch, truncated
/// input -- is the single [`CryptoError::Decrypt`]. Callers must treat it as
/// a security event, not recoverable corruption.
pub fn decrypt(
    encrypted: &EncryptedData,
    key: &SecretBuffer,
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::Decrypt)?;

    cipher
        .decrypt(
            XNonce::from_slice(&encrypted.nonce),
            Payload {
                msg: encrypted.ciphertext.as_slice(),
                aad,
            },
        )
        .map_err(|_| CryptoError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(fill: u8) -> SecretBuffer {
        let mut bytes = [fill; 32];
        SecretBuffer::from_bytes(&mut bytes)
    }

    #[test]
    fn round_trip() {
        let key = test_key(0x11);
        let encrypted = encrypt(b"secret vault data", &key, b"ctx").expect("encrypt");
        assert_eq!(encrypted.ciphertext.len(), b"secret vault data".len() + TAG_BYTES);
        let plaintext = decrypt(&encrypted, &key, b"ctx").expect("decrypt");
        assert_eq!(plaintext, b"secret vault data");
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = encrypt(b"data", &test_key(0x11), b"").expect("encrypt");
        let err = decrypt(&encrypted, &test_key(0x22), b"").expect_err("wrong key");
        assert!(matches!(err, CryptoError::Decrypt));
    }

    #[test]
    fn aad_mismatch_fails() {
        let key = test_key(0x33);
        let encrypted = encrypt(b"data", &key, &1u32.to_le_bytes()).expect("encrypt");
        let err = decrypt(&encrypted, &key, &2u32.to_le_bytes()).expect_err("swapped aad");
        assert!(matches!(err, CryptoError::Decrypt));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key(0x44);
        let mut encrypted = encrypt(b"data", &key, b"").expect("encrypt");
        encrypted.ciphertext[0] ^= 0xFF;
        assert!(decrypt(&encrypted, &key, b"").is_err());
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let key = test_key(0x55);
        let mut encrypted = encrypt(b"data", &key, b"").expect("encrypt");
        encrypted.ciphertext.truncate(TAG_BYTES - 1);
        assert!(decrypt(&encrypted, &key, b"").is_err());
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let key = test_key(0x66);
        let a = encrypt(b"same plaintext", &key, b"").expect("encrypt");
        let b = encrypt(b"same plaintext", &key, b"").expect("encrypt");
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = test_key(0x77);
        let encrypted = encrypt(b"", &key, b"").expect("encrypt");
        assert_eq!(encrypted.ciphertext.len(), TAG_BYTES);
        assert!(decrypt(&encrypted, &key, b"").expect("decrypt").is_empty());
    }

    #[test]
    fn large_plaintext_round_trips() {
        let key = test_key(0x88);
        let plaintext = vec![0xABu8; 64 * 1024];
        let encrypted = encrypt(&plaintext, &key, b"").expect("encrypt");
        assert_eq!(decrypt(&encrypted, &key, b"").expect("decrypt"), plaintext);
    }

    #[test]
    fn utf8_plaintext_round_trips_byte_for_byte() {
        let key = test_key(0x99);
        let text = "日本語のノート 🗒️ — ümlaut";
        let encrypted = encrypt(text.as_bytes(), &key, b"").expect("encrypt");
        let plaintext = decrypt(&encrypted, &key, b"").expect("decrypt");
        assert_eq!(plaintext, text.as_bytes());
    }
}
