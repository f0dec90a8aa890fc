//! Encrypted vault engine for a local secure-notes application.
//!
//! The engine keeps user notes in an at-rest encrypted `SQLite` database and
//! exposes a small synchronous surface: unlock, lock, CRUD, search, settings,
//! password change. Two layers of encryption compose:
//!
//! - every page of the store (including journal and WAL) is encrypted under
//!   a database subkey ([`bastion_db::PageStore`]), and
//! - every note row additionally carries its own AEAD envelope under the
//!   notes subkey, with the row id bound as associated data.
//!
//! All subkeys derive from a single password-derived master key (Argon2id,
//! then HKDF-SHA256 under the `"BastionX"` domain). Key material lives in
//! [`crypto::SecretBuffer`]s that zero themselves on every exit path; while
//! the vault is locked, no subkey exists in memory.
//!
//! The engine spawns no threads and performs no scheduling: operations run
//! to completion on the caller's thread, and slow ones (key derivation,
//! password change) are the caller's to offload. A [`vault::Vault`] and the
//! [`notes::NotesRepository`] obtained from it are exclusive to one thread.
//!
//! The engine never prints; diagnostics go to the [`log`] facade and carry
//! no secret material.

pub mod crypto;
mod error;
pub mod notes;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use notes::{Note, NoteSummary, NotesRepository};
pub use vault::{Vault, VaultSettings, VaultState};

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the epoch, for row timestamps.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
