//! Encrypted CRUD and search over the notes table.
//!
//! The repository owns a keyed page store handle but no content keys: the
//! notes subkey is passed into every call, so key ownership stays with the
//! vault and locking the vault makes the repository's data unreachable.

use std::path::Path;

use bastion_db::PageStore;
use rusqlite::{params, OptionalExtension, TransactionBehavior};

use crate::crypto::{self, EncryptedData, SecretBuffer, NONCE_BYTES};
use crate::error::{VaultError, VaultResult};

use super::model::{self, Note, NoteSummary};

/// Handle for note operations against an unlocked vault's page store.
pub struct NotesRepository {
    store: Option<PageStore>,
}

impl NotesRepository {
    /// Opens the vault database at `path` keyed with the database subkey.
    ///
    /// The vault must already exist with its schema in place.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the file cannot be opened or the key is
    /// rejected.
    pub fn new(path: &Path, db_subkey: &SecretBuffer) -> VaultResult<Self> {
        let store = PageStore::open_encrypted(path, db_subkey.as_bytes())?;
        Ok(Self { store: Some(store) })
    }

    /// Closes the underlying store. Further operations fail.
    pub fn close(&mut self) {
        if let Some(store) = self.store.take() {
            let _ = store.close();
        }
    }

    /// `true` until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Creates a note and returns its assigned id.
    ///
    /// Two-phase, because the id is assigned by the store but also bound
    /// into the AAD: a placeholder row is inserted to obtain the id, then
    /// the real envelope is written. Both phases share one transaction.
    ///
    /// # Errors
    ///
    /// Storage or encryption errors roll the transaction back.
    pub fn create(&mut self, note: &Note, notes_subkey: &SecretBuffer) -> VaultResult<i64> {
        let now = crate::current_timestamp();
        let plaintext = model::encode_note(note);

        let store = self.store_mut()?;
        let tx = store.transaction(TransactionBehavior::Deferred)?;
        tx.execute(
            "INSERT INTO notes (nonce, ciphertext, created_at, updated_at)
             VALUES (zeroblob(24), zeroblob(1), ?1, ?2)",
            params![now, now],
        )?;
        let id = tx.last_insert_rowid();

        let encrypted = crypto::encrypt(&plaintext, notes_subkey, &model::note_aad(id))?;
        tx.execute(
            "UPDATE notes SET nonce = ?1, ciphertext = ?2 WHERE id = ?3",
            params![encrypted.nonce.as_slice(), encrypted.ciphertext, id],
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Reads and decrypts a note.
    ///
    /// Returns `Ok(None)` when the row does not exist, fails to decrypt, or
    /// fails to parse; a wrong key and a tampered row are deliberately
    /// indistinguishable here.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub fn read(&self, id: i64, notes_subkey: &SecretBuffer) -> VaultResult<Option<Note>> {
        let store = self.store()?;
        let row = store
            .conn()
            .query_row(
                "SELECT nonce, ciphertext, created_at, updated_at FROM notes WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((nonce_bytes, ciphertext, created_at, updated_at)) = row else {
            return Ok(None);
        };
        let Some(envelope) = parse_envelope(&nonce_bytes, ciphertext) else {
            return Ok(None);
        };
        let Ok(plaintext) = crypto::decrypt(&envelope, notes_subkey, &model::note_aad(id)) else {
            return Ok(None);
        };
        let Some(mut note) = model::decode_note(&plaintext) else {
            return Ok(None);
        };
        note.id = id;
        note.created_at = created_at;
        note.updated_at = updated_at;
        Ok(Some(note))
    }

    /// Lists all notes, most recently updated first.
    ///
    /// Rows that fail to decrypt or parse are skipped rather than aborting
    /// the listing, so one damaged row cannot hide the rest of the vault.
    ///
    /// # Errors
    ///
    /// Storage errors only.
    pub fn list(&self, notes_subkey: &SecretBuffer) -> VaultResult<Vec<NoteSummary>> {
        let store = self.store()?;
        let mut stmt = store.conn().prepare(
            "SELECT id, nonce, ciphertext, updated_at FROM notes ORDER BY updated_at DESC",
        )?;
        let mut rows = stmt.query([])?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let nonce_bytes: Vec<u8> = row.get(1)?;
            let ciphertext: Vec<u8> = row.get(2)?;
            let updated_at: i64 = row.get(3)?;

            let Some(note) = decrypt_row(id, &nonce_bytes, ciphertext, notes_subkey) else {
                log::debug!("list: skipping undecryptable note row {id}");
                continue;
            };
            summaries.push(NoteSummary {
                id,
                title: note.title,
                preview: model::head_preview(&note.body),
                tags: note.tags,
                updated_at,
            });
        }
        Ok(summaries)
    }

    /// Re-encrypts and stores an existing note with a fresh nonce.
    ///
    /// Returns `Ok(false)` when no row has the note's id. `updated_at` is
    /// set to the current time.
    ///
    /// # Errors
    ///
    /// Storage or encryption errors.
    pub fn update(&self, note: &Note, notes_subkey: &SecretBuffer) -> VaultResult<bool> {
        let store = self.store()?;
        let plaintext = model::encode_note(note);
        let encrypted = crypto::encrypt(&plaintext, notes_subkey, &model::note_aad(note.id))?;
        let changed = store.conn().execute(
            "UPDATE notes SET nonce = ?1, ciphertext = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                encrypted.nonce.as_slice(),
                encrypted.ciphertext,
                crate::current_timestamp(),
                note.id
            ],
        )?;
        Ok(changed > 0)
    }

    /// Deletes a note. Returns `Ok(true)` iff a row was removed.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn delete(&self, id: i64) -> VaultResult<bool> {
        let store = self.store()?;
        let changed = store
            .conn()
            .execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Case-insensitive substring search over title, body, and tags.
    ///
    /// All content at rest is ciphertext, so the search decrypts every row;
    /// cost is linear in the vault size by design (an index would leak
    /// plaintext structure). Queries shorter than two characters return an
    /// empty result. Results are sorted most recently updated first. For
    /// body matches the preview is a window centered on the first match;
    /// otherwise it is the standard head preview.
    ///
    /// # Errors
    ///
    /// Storage errors only; undecryptable rows are skipped.
    pub fn search(&self, notes_subkey: &SecretBuffer, query: &str) -> VaultResult<Vec<NoteSummary>> {
        let query_chars = query.chars().count();
        if query_chars < 2 {
            return Ok(Vec::new());
        }
        let needle = query.to_lowercase();

        let store = self.store()?;
        let mut stmt = store.conn().prepare(
            "SELECT id, nonce, ciphertext, updated_at FROM notes ORDER BY updated_at DESC",
        )?;
        let mut rows = stmt.query([])?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let nonce_bytes: Vec<u8> = row.get(1)?;
            let ciphertext: Vec<u8> = row.get(2)?;
            let updated_at: i64 = row.get(3)?;

            let Some(note) = decrypt_row(id, &nonce_bytes, ciphertext, notes_subkey) else {
                continue;
            };

            let title_hit = note.title.to_lowercase().contains(&needle);
            let tag_hit = note.tags.iter().any(|tag| tag.to_lowercase().contains(&needle));
            let body_lower = note.body.to_lowercase();
            let body_match = body_lower.find(&needle);

            if !title_hit && !tag_hit && body_match.is_none() {
                continue;
            }

            let preview = match body_match {
                Some(byte_idx) => {
                    let char_idx = body_lower[..byte_idx].chars().count();
                    model::context_preview(&note.body, char_idx, query_chars)
                }
                None => model::head_preview(&note.body),
            };
            results.push(NoteSummary {
                id,
                title: note.title,
                preview,
                tags: note.tags,
                updated_at,
            });
        }
        Ok(results)
    }

    fn store(&self) -> VaultResult<&PageStore> {
        self.store
            .as_ref()
            .ok_or_else(|| VaultError::Storage("notes repository is closed".to_string()))
    }

    fn store_mut(&mut self) -> VaultResult<&mut PageStore> {
        self.store
            .as_mut()
            .ok_or_else(|| VaultError::Storage("notes repository is closed".to_string()))
    }
}

impl std::fmt::Debug for NotesRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotesRepository")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn parse_envelope(nonce_bytes: &[u8], ciphertext: Vec<u8>) -> Option<EncryptedData> {
    if nonce_bytes.len() != NONCE_BYTES || ciphertext.is_empty() {
        return None;
    }
    let mut nonce = [0u8; NONCE_BYTES];
    nonce.copy_from_slice(nonce_bytes);
    Some(EncryptedData { nonce, ciphertext })
}

fn decrypt_row(
    id: i64,
    nonce_bytes: &[u8],
    ciphertext: Vec<u8>,
    notes_subkey: &SecretBuffer,
) -> Option<Note> {
    let envelope = parse_envelope(nonce_bytes, ciphertext)?;
    let plaintext = crypto::decrypt(&envelope, notes_subkey, &model::note_aad(id)).ok()?;
    model::decode_note(&plaintext)
}
