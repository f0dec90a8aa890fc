//! Salt sidecar file.
//!
//! The Argon2id salt lives next to the database (`vault.db` -> `vault.salt`)
//! because the salt must be readable *before* the encrypted store can be
//! opened. Its absence is the signal that the file was produced by the
//! legacy plaintext-store predecessor.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::crypto::SALT_BYTES;

/// Sidecar path for a given database path: the extension becomes `salt`.
#[must_use]
pub fn salt_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("salt")
}

/// Writes the 16-byte salt, truncating any previous content.
///
/// The file is fsynced before returning; vault creation and password change
/// both depend on the sidecar being durable before they report success.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn write_salt(db_path: &Path, salt: &[u8; SALT_BYTES]) -> io::Result<()> {
    let mut file = File::create(salt_path(db_path))?;
    file.write_all(salt)?;
    file.sync_all()
}

/// Reads the sidecar salt.
///
/// Returns `Ok(None)` when the file is missing or shorter than 16 bytes;
/// both mean "no usable sidecar", not an error.
///
/// # Errors
///
/// Returns I/O errors other than not-found.
pub fn read_salt(db_path: &Path) -> io::Result<Option<[u8; SALT_BYTES]>> {
    let bytes = match fs::read(salt_path(db_path)) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    if bytes.len() < SALT_BYTES {
        return Ok(None);
    }
    let mut salt = [0u8; SALT_BYTES];
    salt.copy_from_slice(&bytes[..SALT_BYTES]);
    Ok(Some(salt))
}
