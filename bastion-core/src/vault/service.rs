//! Vault lifecycle: state machine, key hierarchy, password verification.
//!
//! The vault holds at most four subkeys in memory (notes, settings, verify,
//! database), each derived from the password-derived master key. The master
//! key itself is dropped as soon as the subkeys exist. Locking resets the
//! four `Option<SecretBuffer>` fields, which zeroes the key bytes on drop.
//!
//! "Password correct" is defined as: the token stored in `vault_verify`
//! decrypts under the verification subkey to the 32-byte known marker. The
//! page-level key check (a wrong key fails authentication on the first page
//! read) and the token check are deliberately reported identically, so a
//! future key-management scheme can store verification independently of the
//! page key.

use std::path::{Path, PathBuf};

use bastion_db::{DbError, PageStore};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::crypto::{
    self, EncryptedData, KdfParams, SecretBuffer, NONCE_BYTES, SALT_BYTES, SUBKEY_DATABASE,
    SUBKEY_NOTES, SUBKEY_SETTINGS, SUBKEY_VERIFY,
};
use crate::error::{VaultError, VaultResult};
use crate::notes::model::note_aad;

use super::salt;

/// Known plaintext encrypted under the verification subkey; its successful
/// authenticated decryption is the password check.
pub const VERIFY_MARKER: &[u8; 32] = b"BASTIONX_VAULT_VERIFY_OK_MARKER\0";

/// Current vault schema version.
const SCHEMA_VERSION: i64 = 1;

/// Vault lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// No database file exists at the path.
    NoVault,
    /// The file exists; no key material is in memory.
    Locked,
    /// Subkeys are in memory and the store is reachable.
    Unlocked,
}

/// The vault lifecycle coordinator.
///
/// Exclusive to one thread; all operations run synchronously on the caller's
/// thread. `create`, `unlock`, and `change_password` block for the duration
/// of password hashing (hundreds of milliseconds by design).
pub struct Vault {
    pub(super) path: PathBuf,
    pub(super) state: VaultState,
    pub(super) salt: [u8; SALT_BYTES],
    pub(super) kdf_params: KdfParams,
    pub(super) notes_subkey: Option<SecretBuffer>,
    pub(super) verify_subkey: Option<SecretBuffer>,
    pub(super) settings_subkey: Option<SecretBuffer>,
    pub(super) db_subkey: Option<SecretBuffer>,
}

impl Vault {
    /// Constructs a vault handle for `path`.
    ///
    /// Never touches the file; the initial state is [`VaultState::Locked`]
    /// when the file exists and [`VaultState::NoVault`] otherwise.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = if path.exists() {
            VaultState::Locked
        } else {
            VaultState::NoVault
        };
        Self {
            path,
            state,
            salt: [0u8; SALT_BYTES],
            kdf_params: KdfParams::MODERATE,
            notes_subkey: None,
            verify_subkey: None,
            settings_subkey: None,
            db_subkey: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> VaultState {
        self.state
    }

    /// `true` when subkeys are in memory.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.state == VaultState::Unlocked
    }

    /// The database file path this vault was constructed for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates a new vault protected by `password`.
    ///
    /// Returns `Ok(false)` when a vault file already exists. On success the
    /// salt sidecar is durable, the store is encrypted from birth, the schema
    /// and verification token are in place, and the vault is unlocked.
    ///
    /// # Errors
    ///
    /// [`VaultError::KeyDerivation`] or [`VaultError::Storage`]. A failure
    /// leaves the vault locked with no key material in memory.
    pub fn create(&mut self, password: &str) -> VaultResult<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        let derived = crypto::derive_master_key(password, None, KdfParams::MODERATE)?;

        // The sidecar must be durable before the encrypted file can exist:
        // an interrupted create must never produce a store whose salt is
        // unrecoverable.
        salt::write_salt(&self.path, &derived.salt)?;

        let db_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_DATABASE)?;
        let store = PageStore::open_encrypted(&self.path, db_subkey.as_bytes())?;
        ensure_schema(store.conn())?;
        replace_vault_meta(store.conn(), &derived.salt, KdfParams::MODERATE)?;

        let verify_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_VERIFY)?;
        store_verify_token(store.conn(), &verify_subkey)?;

        let notes_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_NOTES)?;
        let settings_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_SETTINGS)?;

        self.salt = derived.salt;
        self.kdf_params = KdfParams::MODERATE;
        self.db_subkey = Some(db_subkey);
        self.verify_subkey = Some(verify_subkey);
        self.notes_subkey = Some(notes_subkey);
        self.settings_subkey = Some(settings_subkey);
        self.state = VaultState::Unlocked;
        log::debug!("vault created at {}", self.path.display());
        Ok(true)
    }

    /// Unlocks an existing vault with `password`.
    ///
    /// Returns `Ok(false)` on a wrong password, with all key material wiped.
    /// A database file without a salt sidecar is treated as a legacy
    /// plaintext-store vault and migrated in place (see the module docs on
    /// [`super::migrate`]). Unlocking an already-unlocked vault is a no-op
    /// returning `Ok(true)`.
    ///
    /// # Errors
    ///
    /// [`VaultError::Missing`] when no file exists, [`VaultError::Corrupt`]
    /// when the sidecar and metadata disagree or singleton rows are
    /// malformed, plus derivation and storage errors.
    pub fn unlock(&mut self, password: &str) -> VaultResult<bool> {
        if !self.path.exists() {
            self.state = VaultState::NoVault;
            return Err(VaultError::Missing);
        }
        if self.state == VaultState::Unlocked {
            return Ok(true);
        }

        let Some(file_salt) = salt::read_salt(&self.path)? else {
            return self.migrate_and_unlock(password);
        };

        let derived = crypto::derive_master_key(password, Some(file_salt), self.kdf_params)?;
        let db_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_DATABASE)?;

        // A wrong password produces a wrong page key, which fails
        // authentication on the first page read.
        let store = match PageStore::open_encrypted(&self.path, db_subkey.as_bytes()) {
            Ok(store) => store,
            Err(DbError::KeyRejected) => {
                self.state = VaultState::Locked;
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        let meta = load_vault_meta(store.conn())?;
        if meta.salt != file_salt {
            self.state = VaultState::Locked;
            return Err(VaultError::Corrupt(
                "salt sidecar disagrees with vault metadata".to_string(),
            ));
        }

        let verify_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_VERIFY)?;
        let token = load_verify_token(store.conn())?;
        match crypto::decrypt(&token, &verify_subkey, &[]) {
            Ok(plaintext) if plaintext.as_slice() == VERIFY_MARKER => {}
            _ => {
                self.wipe_keys();
                self.state = VaultState::Locked;
                return Ok(false);
            }
        }

        let notes_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_NOTES)?;
        let settings_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_SETTINGS)?;

        ensure_schema(store.conn())?;

        self.salt = file_salt;
        self.kdf_params = KdfParams {
            opslimit: meta.opslimit,
            memlimit: meta.memlimit,
        };
        self.db_subkey = Some(db_subkey);
        self.verify_subkey = Some(verify_subkey);
        self.notes_subkey = Some(notes_subkey);
        self.settings_subkey = Some(settings_subkey);
        self.state = VaultState::Unlocked;
        Ok(true)
    }

    /// Locks the vault, wiping all key material.
    ///
    /// The state returns to [`VaultState::Locked`], or [`VaultState::NoVault`]
    /// if the file has disappeared.
    pub fn lock(&mut self) {
        self.wipe_keys();
        self.state = if self.path.exists() {
            VaultState::Locked
        } else {
            VaultState::NoVault
        };
    }

    /// Changes the vault password, re-encrypting every record.
    ///
    /// Returns `Ok(false)` when `current_password` is wrong; nothing is
    /// written in that case. Otherwise all note envelopes, the verify token,
    /// the settings row, and the metadata are rewritten under fresh subkeys
    /// inside one exclusive transaction, then the page store file key is
    /// replaced and the salt sidecar overwritten.
    ///
    /// Any failure before the commit rolls back and leaves the vault usable
    /// with the current password. Failures after the commit (rekey, sidecar)
    /// are fatal to the session: keys are wiped and the vault locks.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when called on a locked vault, plus derivation,
    /// corruption, and storage errors.
    pub fn change_password(
        &mut self,
        current_password: &str,
        new_password: &str,
    ) -> VaultResult<bool> {
        if self.state != VaultState::Unlocked {
            return Err(VaultError::Locked);
        }
        let db_subkey = self.db_subkey.as_ref().ok_or(VaultError::Locked)?;
        let notes_subkey = self.notes_subkey.as_ref().ok_or(VaultError::Locked)?;
        let settings_subkey = self.settings_subkey.as_ref().ok_or(VaultError::Locked)?;

        let mut store = PageStore::open_encrypted(&self.path, db_subkey.as_bytes())?;

        // Verify the current password before touching anything.
        let current = crypto::derive_master_key(current_password, Some(self.salt), self.kdf_params)?;
        let candidate_verify = crypto::derive_subkey(&current.master_key, SUBKEY_VERIFY)?;
        let token = load_verify_token(store.conn())?;
        match crypto::decrypt(&token, &candidate_verify, &[]) {
            Ok(plaintext) if plaintext.as_slice() == VERIFY_MARKER => {}
            _ => return Ok(false),
        }

        let new_derived = crypto::derive_master_key(new_password, None, KdfParams::MODERATE)?;
        let new_notes = crypto::derive_subkey(&new_derived.master_key, SUBKEY_NOTES)?;
        let new_verify = crypto::derive_subkey(&new_derived.master_key, SUBKEY_VERIFY)?;
        let new_settings = crypto::derive_subkey(&new_derived.master_key, SUBKEY_SETTINGS)?;
        let new_db = crypto::derive_subkey(&new_derived.master_key, SUBKEY_DATABASE)?;

        // Inner envelope rotation is atomic in SQL.
        {
            let tx = store.transaction(TransactionBehavior::Exclusive)?;
            reencrypt_notes(&tx, notes_subkey, &new_notes)?;
            replace_verify_token(&tx, &new_verify)?;
            reencrypt_settings(&tx, settings_subkey, &new_settings)?;
            replace_vault_meta(&tx, &new_derived.salt, KdfParams::MODERATE)?;
            tx.commit()?;
        }

        // The page-level rekey and sidecar update follow the commit. A
        // failure here leaves the store consistent under the new inner keys
        // but the session cannot continue.
        if let Err(err) = store.rekey(new_db.as_bytes()) {
            self.wipe_keys();
            self.state = VaultState::Locked;
            return Err(err.into());
        }
        if let Err(err) = salt::write_salt(&self.path, &new_derived.salt) {
            self.wipe_keys();
            self.state = VaultState::Locked;
            return Err(err.into());
        }

        self.salt = new_derived.salt;
        self.kdf_params = KdfParams::MODERATE;
        self.notes_subkey = Some(new_notes);
        self.verify_subkey = Some(new_verify);
        self.settings_subkey = Some(new_settings);
        self.db_subkey = Some(new_db);
        log::debug!("vault password changed, all records re-encrypted");
        Ok(true)
    }

    /// The notes subkey, for handing to `NotesRepository` operations.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when the vault is not unlocked.
    pub fn notes_subkey(&self) -> VaultResult<&SecretBuffer> {
        match (self.state, self.notes_subkey.as_ref()) {
            (VaultState::Unlocked, Some(key)) => Ok(key),
            _ => Err(VaultError::Locked),
        }
    }

    /// The settings subkey.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when the vault is not unlocked.
    pub fn settings_subkey(&self) -> VaultResult<&SecretBuffer> {
        match (self.state, self.settings_subkey.as_ref()) {
            (VaultState::Unlocked, Some(key)) => Ok(key),
            _ => Err(VaultError::Locked),
        }
    }

    /// The page store subkey, for opening a `NotesRepository` on this vault.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when the vault is not unlocked.
    pub fn db_subkey(&self) -> VaultResult<&SecretBuffer> {
        match (self.state, self.db_subkey.as_ref()) {
            (VaultState::Unlocked, Some(key)) => Ok(key),
            _ => Err(VaultError::Locked),
        }
    }

    /// Encrypts and stores the settings JSON, replacing any previous row.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when locked, storage errors otherwise.
    pub fn save_settings(&self, json: &str) -> VaultResult<()> {
        let settings_subkey = self.settings_subkey()?;
        let db_subkey = self.db_subkey()?;

        let store = PageStore::open_encrypted(&self.path, db_subkey.as_bytes())?;
        ensure_schema(store.conn())?;

        let encrypted = crypto::encrypt(json.as_bytes(), settings_subkey, &[])?;
        store.conn().execute("DELETE FROM vault_settings", [])?;
        store.conn().execute(
            "INSERT INTO vault_settings (nonce, ciphertext) VALUES (?1, ?2)",
            params![encrypted.nonce.as_slice(), encrypted.ciphertext],
        )?;
        Ok(())
    }

    /// Loads and decrypts the settings JSON.
    ///
    /// Returns an empty string when no settings row exists.
    ///
    /// # Errors
    ///
    /// [`VaultError::Locked`] when locked; [`VaultError::Corrupt`] when a
    /// row is present but fails to decrypt under the derived key.
    pub fn load_settings(&self) -> VaultResult<String> {
        let settings_subkey = self.settings_subkey()?;
        let db_subkey = self.db_subkey()?;

        let store = PageStore::open_encrypted(&self.path, db_subkey.as_bytes())?;
        ensure_schema(store.conn())?;

        let Some(envelope) = load_settings_row(store.conn())? else {
            return Ok(String::new());
        };
        let plaintext = crypto::decrypt(&envelope, settings_subkey, &[])
            .map_err(|_| VaultError::Corrupt("settings row failed to decrypt".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Corrupt("settings are not valid UTF-8".to_string()))
    }

    pub(super) fn wipe_keys(&mut self) {
        // Dropping a SecretBuffer zeroes its bytes.
        self.notes_subkey = None;
        self.verify_subkey = None;
        self.settings_subkey = None;
        self.db_subkey = None;
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("path", &self.path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// === Schema and singleton-row helpers ===
//
// These take a `&Connection` so they work against both a plain store handle
// and an open transaction (which derefs to one).

pub(super) fn ensure_schema(conn: &Connection) -> VaultResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vault_meta (
            version      INTEGER NOT NULL DEFAULT 1,
            salt         BLOB NOT NULL,
            kdf_opslimit INTEGER NOT NULL,
            kdf_memlimit INTEGER NOT NULL,
            created_at   INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vault_verify (
            nonce       BLOB NOT NULL,
            ciphertext  BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notes (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            nonce       BLOB NOT NULL,
            ciphertext  BLOB NOT NULL,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vault_settings (
            nonce      BLOB NOT NULL,
            ciphertext BLOB NOT NULL
        );",
    )?;
    Ok(())
}

pub(super) struct VaultMeta {
    pub(super) salt: [u8; SALT_BYTES],
    pub(super) opslimit: u64,
    pub(super) memlimit: u64,
}

pub(super) fn load_vault_meta(conn: &Connection) -> VaultResult<VaultMeta> {
    let row = conn
        .query_row(
            "SELECT salt, kdf_opslimit, kdf_memlimit FROM vault_meta LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((salt_bytes, opslimit, memlimit)) = row else {
        return Err(VaultError::Corrupt("vault metadata missing".to_string()));
    };
    if salt_bytes.len() != SALT_BYTES {
        return Err(VaultError::Corrupt("vault metadata salt malformed".to_string()));
    }
    let mut meta_salt = [0u8; SALT_BYTES];
    meta_salt.copy_from_slice(&salt_bytes);
    Ok(VaultMeta {
        salt: meta_salt,
        opslimit: opslimit.max(0) as u64,
        memlimit: memlimit.max(0) as u64,
    })
}

pub(super) fn replace_vault_meta(
    conn: &Connection,
    new_salt: &[u8; SALT_BYTES],
    kdf: KdfParams,
) -> VaultResult<()> {
    conn.execute("DELETE FROM vault_meta", [])?;
    conn.execute(
        "INSERT INTO vault_meta (version, salt, kdf_opslimit, kdf_memlimit, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            SCHEMA_VERSION,
            new_salt.as_slice(),
            kdf.opslimit as i64,
            kdf.memlimit as i64,
            crate::current_timestamp(),
        ],
    )?;
    Ok(())
}

pub(super) fn load_verify_token(conn: &Connection) -> VaultResult<EncryptedData> {
    let row = conn
        .query_row(
            "SELECT nonce, ciphertext FROM vault_verify LIMIT 1",
            [],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
        )
        .optional()?;
    let Some((nonce_bytes, ciphertext)) = row else {
        return Err(VaultError::Corrupt("verify token missing".to_string()));
    };
    if nonce_bytes.len() != NONCE_BYTES || ciphertext.is_empty() {
        return Err(VaultError::Corrupt("verify token malformed".to_string()));
    }
    let mut nonce = [0u8; NONCE_BYTES];
    nonce.copy_from_slice(&nonce_bytes);
    Ok(EncryptedData { nonce, ciphertext })
}

pub(super) fn store_verify_token(
    conn: &Connection,
    verify_subkey: &SecretBuffer,
) -> VaultResult<()> {
    let encrypted = crypto::encrypt(VERIFY_MARKER, verify_subkey, &[])?;
    conn.execute(
        "INSERT INTO vault_verify (nonce, ciphertext) VALUES (?1, ?2)",
        params![encrypted.nonce.as_slice(), encrypted.ciphertext],
    )?;
    Ok(())
}

fn replace_verify_token(conn: &Connection, new_verify: &SecretBuffer) -> VaultResult<()> {
    conn.execute("DELETE FROM vault_verify", [])?;
    store_verify_token(conn, new_verify)
}

fn load_settings_row(conn: &Connection) -> VaultResult<Option<EncryptedData>> {
    let row = conn
        .query_row(
            "SELECT nonce, ciphertext FROM vault_settings LIMIT 1",
            [],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?)),
        )
        .optional()?;
    let Some((nonce_bytes, ciphertext)) = row else {
        return Ok(None);
    };
    if nonce_bytes.len() != NONCE_BYTES || ciphertext.is_empty() {
        return Err(VaultError::Corrupt("settings row malformed".to_string()));
    }
    let mut nonce = [0u8; NONCE_BYTES];
    nonce.copy_from_slice(&nonce_bytes);
    Ok(Some(EncryptedData { nonce, ciphertext }))
}

fn reencrypt_notes(
    conn: &Connection,
    old_key: &SecretBuffer,
    new_key: &SecretBuffer,
) -> VaultResult<()> {
    struct NoteRow {
        id: i64,
        envelope: EncryptedData,
    }

    // Collected up front; the table cannot be updated while a SELECT walks it.
    let mut note_rows = Vec::new();
    {
        let mut stmt = conn.prepare("SELECT id, nonce, ciphertext FROM notes")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let nonce_bytes: Vec<u8> = row.get(1)?;
            let ciphertext: Vec<u8> = row.get(2)?;
            if nonce_bytes.len() != NONCE_BYTES || ciphertext.is_empty() {
                return Err(VaultError::Corrupt(format!(
                    "note {id} envelope malformed during password change"
                )));
            }
            let mut nonce = [0u8; NONCE_BYTES];
            nonce.copy_from_slice(&nonce_bytes);
            note_rows.push(NoteRow {
                id,
                envelope: EncryptedData { nonce, ciphertext },
            });
        }
    }

    for row in note_rows {
        let aad = note_aad(row.id);
        let plaintext = crypto::decrypt(&row.envelope, old_key, &aad).map_err(|_| {
            VaultError::Storage(format!(
                "note {} failed to decrypt during password change",
                row.id
            ))
        })?;
        let reencrypted = crypto::encrypt(&plaintext, new_key, &aad)?;
        conn.execute(
            "UPDATE notes SET nonce = ?1, ciphertext = ?2 WHERE id = ?3",
            params![reencrypted.nonce.as_slice(), reencrypted.ciphertext, row.id],
        )?;
    }
    Ok(())
}

fn reencrypt_settings(
    conn: &Connection,
    old_key: &SecretBuffer,
    new_key: &SecretBuffer,
) -> VaultResult<()> {
    let Some(envelope) = load_settings_row(conn)? else {
        return Ok(());
    };
    let plaintext = crypto::decrypt(&envelope, old_key, &[]).map_err(|_| {
        VaultError::Storage("settings failed to decrypt during password change".to_string())
    })?;
    conn.execute("DELETE FROM vault_settings", [])?;
    let reencrypted = crypto::encrypt(&plaintext, new_key, &[])?;
    conn.execute(
        "INSERT INTO vault_settings (nonce, ciphertext) VALUES (?1, ?2)",
        params![reencrypted.nonce.as_slice(), reencrypted.ciphertext],
    )?;
    Ok(())
}
