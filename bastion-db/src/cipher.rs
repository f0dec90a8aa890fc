//! `SQLCipher` keying helpers.
//!
//! All key material passes through these functions as raw bytes and is
//! hex-encoded into `PRAGMA` text inside [`Zeroizing`] buffers, so the
//! encoded copies are wiped regardless of which exit path is taken.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use zeroize::Zeroizing;

use crate::error::{DbError, DbResult};

/// Applies the raw encryption key and validates cipher availability.
///
/// The `x'<hex>'` form tells `SQLCipher` to use the bytes directly instead of
/// running a passphrase KDF. `PRAGMA cipher_version` returns no row on a
/// build without `SQLCipher` compiled in, which would otherwise silently
/// produce a plaintext database.
pub(crate) fn apply_key(conn: &Connection, key: &[u8]) -> DbResult<()> {
    let key_hex = Zeroizing::new(hex::encode(key));
    let pragma = Zeroizing::new(format!("PRAGMA key = \"x'{}'\";", key_hex.as_str()));
    conn.execute_batch(&pragma)?;

    let cipher_version: Option<String> = conn
        .query_row("PRAGMA cipher_version;", [], |row| row.get(0))
        .optional()?;
    match cipher_version {
        Some(v) if !v.trim().is_empty() => {}
        _ => return Err(DbError::CipherUnavailable),
    }

    // SQLCipher wipes its own page cache allocations before freeing them.
    conn.execute_batch("PRAGMA cipher_memory_security = ON;")?;
    Ok(())
}

/// Touches the first page to verify the key.
///
/// With a wrong key the pager reports `SQLITE_NOTADB`; that case is mapped to
/// [`DbError::KeyRejected`] so callers can distinguish authentication failure
/// from other storage errors.
pub(crate) fn verify_key(conn: &Connection) -> DbResult<()> {
    conn.execute_batch("SELECT count(*) FROM sqlite_master;")
        .map_err(|err| {
            if is_not_a_database(&err) {
                DbError::KeyRejected
            } else {
                DbError::Sqlite(err)
            }
        })
}

/// Configures durable WAL settings.
///
/// `synchronous = FULL` fsyncs WAL pages before a commit is reported, and
/// `foreign_keys = ON` enforces referential constraints.
pub(crate) fn configure_connection(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;",
    )?;
    Ok(())
}

/// Replaces the file encryption key in place via `PRAGMA rekey`.
pub(crate) fn rekey(conn: &Connection, new_key: &[u8]) -> DbResult<()> {
    let key_hex = Zeroizing::new(hex::encode(new_key));
    let pragma = Zeroizing::new(format!("PRAGMA rekey = \"x'{}'\";", key_hex.as_str()));
    conn.execute_batch(&pragma)?;
    Ok(())
}

/// Exports the full contents of `conn` into a sibling database encrypted
/// under `key`, using `sqlcipher_export`.
///
/// The target file must not exist with conflicting content; callers remove
/// stale targets first.
pub(crate) fn export_encrypted(conn: &Connection, target: &Path, key: &[u8]) -> DbResult<()> {
    let key_hex = Zeroizing::new(hex::encode(key));
    // Single quotes in the path are doubled per SQL string literal rules.
    let target_sql = target.to_string_lossy().replace('\'', "''");
    let attach = Zeroizing::new(format!(
        "ATTACH DATABASE '{}' AS export_target KEY \"x'{}'\";",
        target_sql,
        key_hex.as_str()
    ));
    conn.execute_batch(&attach)?;
    let result = conn.execute_batch(
        "SELECT sqlcipher_export('export_target');
         DETACH DATABASE export_target;",
    );
    result.map_err(DbError::Sqlite)
}

/// Runs `PRAGMA integrity_check` and reports whether the database is healthy.
pub(crate) fn integrity_check(conn: &Connection) -> DbResult<bool> {
    let result: String = conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
    Ok(result.trim() == "ok")
}

fn is_not_a_database(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::NotADatabase
    )
}
