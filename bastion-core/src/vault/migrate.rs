//! Migration from the legacy plaintext-store format.
//!
//! Early vaults used per-record envelope encryption over an *unencrypted*
//! page store and kept the salt in `vault_meta` instead of a sidecar. A
//! database file with no salt sidecar is assumed to be such a vault.
//!
//! The migration is crash-safe because the commit point is a pair of file
//! renames of an already-complete encrypted copy:
//!
//! 1. Open the store plaintext, recover the salt from `vault_meta`, verify
//!    the password against the token. A failure aborts with no file touched.
//! 2. Export everything into `<path>.encrypted` keyed with the database
//!    subkey, then close the plaintext handle and drop its stale `-wal` /
//!    `-shm` sidecars.
//! 3. Rename `<path>` -> `<path>.bak`, then `<path>.encrypted` -> `<path>`.
//!    Either rename failing restores the original.
//! 4. Write the salt sidecar, reopen keyed, run the schema migration, and
//!    only then remove the `.bak`.
//!
//! A crash before step 3 leaves the original plaintext file intact; a crash
//! after leaves an encrypted file plus a stale `.bak` that the next
//! successful unlock removes here.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use bastion_db::PageStore;

use crate::crypto::{
    self, KdfParams, SUBKEY_DATABASE, SUBKEY_NOTES, SUBKEY_SETTINGS, SUBKEY_VERIFY,
};
use crate::error::VaultResult;

use super::service::{
    ensure_schema, load_vault_meta, load_verify_token, Vault, VaultState, VERIFY_MARKER,
};
use super::salt;

impl Vault {
    pub(super) fn migrate_and_unlock(&mut self, password: &str) -> VaultResult<bool> {
        let encrypted_path = append_suffix(&self.path, ".encrypted");
        let backup_path = append_suffix(&self.path, ".bak");

        log::debug!(
            "no salt sidecar at {}; attempting legacy store migration",
            self.path.display()
        );

        // Phase 1: verify the password and export an encrypted copy. The
        // plaintext handle must be closed before the file swap.
        let (master_key, file_salt, meta_params) = {
            let plain_store = PageStore::open_plaintext(&self.path)?;
            let meta = load_vault_meta(plain_store.conn())?;

            let derived = crypto::derive_master_key(password, Some(meta.salt), self.kdf_params)?;
            let verify_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_VERIFY)?;
            let token = load_verify_token(plain_store.conn())?;
            match crypto::decrypt(&token, &verify_subkey, &[]) {
                Ok(plaintext) if plaintext.as_slice() == VERIFY_MARKER => {}
                _ => {
                    self.state = VaultState::Locked;
                    return Ok(false);
                }
            }

            let db_subkey = crypto::derive_subkey(&derived.master_key, SUBKEY_DATABASE)?;

            // Leftovers from a previously interrupted migration.
            let _ = fs::remove_file(&encrypted_path);

            plain_store.export_encrypted(&encrypted_path, db_subkey.as_bytes())?;
            plain_store.close()?;

            (derived.master_key, meta.salt, (meta.opslimit, meta.memlimit))
        };

        // Phase 2: swap files. These renames are the commit point.
        let _ = fs::remove_file(append_suffix(&self.path, "-wal"));
        let _ = fs::remove_file(append_suffix(&self.path, "-shm"));
        let _ = fs::remove_file(&backup_path);

        if let Err(err) = fs::rename(&self.path, &backup_path) {
            let _ = fs::remove_file(&encrypted_path);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&encrypted_path, &self.path) {
            let _ = fs::rename(&backup_path, &self.path);
            return Err(err.into());
        }

        // Phase 3: the sidecar makes the migrated file unlockable.
        salt::write_salt(&self.path, &file_salt)?;

        // Phase 4: finish the unlock against the encrypted file. The backup
        // is only removed once the schema migration has succeeded; until
        // then the next unlock retries it (idempotently).
        let db_subkey = crypto::derive_subkey(&master_key, SUBKEY_DATABASE)?;
        let notes_subkey = crypto::derive_subkey(&master_key, SUBKEY_NOTES)?;
        let settings_subkey = crypto::derive_subkey(&master_key, SUBKEY_SETTINGS)?;
        let verify_subkey = crypto::derive_subkey(&master_key, SUBKEY_VERIFY)?;

        {
            let store = PageStore::open_encrypted(&self.path, db_subkey.as_bytes())?;
            ensure_schema(store.conn())?;
        }
        let _ = fs::remove_file(&backup_path);

        self.salt = file_salt;
        self.kdf_params = KdfParams {
            opslimit: meta_params.0,
            memlimit: meta_params.1,
        };
        self.db_subkey = Some(db_subkey);
        self.notes_subkey = Some(notes_subkey);
        self.settings_subkey = Some(settings_subkey);
        self.verify_subkey = Some(verify_subkey);
        self.state = VaultState::Unlocked;
        log::debug!("legacy store migrated to encrypted format");
        Ok(true)
    }
}

/// `vault.db` + `".bak"` -> `vault.db.bak` (appends, unlike `with_extension`).
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
