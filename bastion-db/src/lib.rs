//! Keyed `SQLite` page store backed by `SQLCipher`.
//!
//! This crate provides a small handle type over `rusqlite` (built with the
//! `bundled-sqlcipher` feature) that owns the encryption concerns of a vault
//! database file:
//!
//! 1. **Open** -- `sqlite3_open_v2` creates or opens the database file. At
//!    this point an encrypted file is opaque and no page can be read.
//! 2. **Key** -- `PRAGMA key = "x'<hex>'"` hands the raw 32-byte key to the
//!    pager layer. From here on every page read is decrypted and every page
//!    written is encrypted, including the journal and WAL sidecars.
//! 3. **Verify** -- a read of `sqlite_master` touches the first page. With a
//!    wrong key the pager reports `SQLITE_NOTADB` because the decrypted
//!    header does not match the `SQLite` magic; this is surfaced as
//!    [`DbError::KeyRejected`] so callers can treat it as an authentication
//!    failure rather than corruption.
//! 4. **Configure** -- WAL journal mode and `synchronous = FULL` for crash
//!    consistency.
//!
//! Consumers run their own SQL through [`PageStore::conn`]; this crate never
//! interprets vault schemas.

mod cipher;
mod error;
mod store;

pub use error::{DbError, DbResult};
pub use store::PageStore;

// Re-exported so consumers bind parameters against the same rusqlite build.
pub use rusqlite;
