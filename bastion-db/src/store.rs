//! The page store handle.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use crate::cipher;
use crate::error::{DbError, DbResult};

/// A handle to a `SQLite` database whose pages are encrypted under a caller
/// supplied key.
///
/// Closed when dropped. Not `Sync`; a store and the statements prepared from
/// it belong to a single thread. Concurrent writers on the same file are
/// rejected by `SQLite`'s own locking.
pub struct PageStore {
    conn: Connection,
}

impl PageStore {
    /// Opens (or creates) the database at `path` keyed with `key`, then
    /// verifies the key and configures WAL journaling.
    ///
    /// # Errors
    ///
    /// [`DbError::KeyRejected`] when the key fails page authentication,
    /// [`DbError::CipherUnavailable`] when the build lacks `SQLCipher`, and
    /// [`DbError::Sqlite`] for anything else.
    pub fn open_encrypted(path: &Path, key: &[u8]) -> DbResult<Self> {
        let conn = open_connection(path)?;
        cipher::apply_key(&conn, key)?;
        cipher::verify_key(&conn)?;
        cipher::configure_connection(&conn)?;
        log::debug!("opened encrypted page store at {}", path.display());
        Ok(Self { conn })
    }

    /// Opens the database at `path` without keying.
    ///
    /// Only used while migrating a legacy plaintext store; newly created
    /// vaults are encrypted from birth.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the file cannot be opened.
    pub fn open_plaintext(path: &Path) -> DbResult<Self> {
        let conn = open_connection(path)?;
        Ok(Self { conn })
    }

    /// Borrows the underlying connection for queries and statements.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begins a transaction with the given behavior.
    ///
    /// Commits on [`Transaction::commit`]; rolls back when dropped without a
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the transaction cannot be started.
    pub fn transaction(&mut self, behavior: TransactionBehavior) -> DbResult<Transaction<'_>> {
        Ok(self.conn.transaction_with_behavior(behavior)?)
    }

    /// Replaces the file encryption key. All pages are re-encrypted in place
    /// and subsequent opens require the new key.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the rekey fails; the store then still
    /// carries the old key.
    pub fn rekey(&self, new_key: &[u8]) -> DbResult<()> {
        cipher::rekey(&self.conn, new_key)?;
        log::debug!("page store rekeyed");
        Ok(())
    }

    /// Exports the full contents into `target`, encrypted under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the attach or export fails.
    pub fn export_encrypted(&self, target: &Path, key: &[u8]) -> DbResult<()> {
        cipher::export_encrypted(&self.conn, target, key)
    }

    /// Runs an integrity check.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the check cannot be executed.
    pub fn integrity_check(&self) -> DbResult<bool> {
        cipher::integrity_check(&self.conn)
    }

    /// Closes the store, flushing and releasing the file handle.
    ///
    /// Dropping the store has the same effect; this form surfaces the error.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if finalization fails.
    pub fn close(self) -> DbResult<()> {
        self.conn.close().map_err(|(_, err)| DbError::Sqlite(err))
    }
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore").finish_non_exhaustive()
    }
}

fn open_connection(path: &Path) -> DbResult<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    Ok(Connection::open_with_flags(path, flags)?)
}
