//! Error types for the keyed page store.

use std::fmt;

/// Errors raised while opening, keying, or driving the page store.
#[derive(Debug)]
pub enum DbError {
    /// `SQLite` error.
    Sqlite(rusqlite::Error),
    /// `SQLCipher` is unavailable in the current build.
    CipherUnavailable,
    /// The supplied key failed page authentication on first read.
    ///
    /// Indistinguishable from a corrupt file without the right key; callers
    /// decide which interpretation applies.
    KeyRejected,
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::CipherUnavailable => write!(f, "sqlcipher not available"),
            Self::KeyRejected => write!(f, "page store rejected the encryption key"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err)
    }
}

/// Result type for page store operations.
pub type DbResult<T> = Result<T, DbError>;
