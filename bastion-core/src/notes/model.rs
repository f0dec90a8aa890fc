//! Note data model and envelope encoding.

use serde::{Deserialize, Serialize};

/// Decrypted note. Exists in memory only; never persisted as plaintext.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Note {
    /// Row id; 0 before first persistence, positive and stable afterwards.
    pub id: i64,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    /// Seconds since epoch, assigned at first persistence.
    pub created_at: i64,
    /// Seconds since epoch, rewritten on every successful update.
    pub updated_at: i64,
}

/// Projection returned by list and search. Never contains ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSummary {
    pub id: i64,
    pub title: String,
    /// Head of the body, or a window around the match for search hits.
    pub preview: String,
    pub tags: Vec<String>,
    pub updated_at: i64,
}

/// The encrypted payload: `{"title","body","tags","version":1}`.
///
/// Readers tolerate unknown fields and default missing ones so that future
/// versions can add fields without breaking older vault consumers.
#[derive(Serialize, Deserialize)]
struct NoteEnvelope {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    version: u32,
}

/// Envelope format version written by this engine.
const ENVELOPE_VERSION: u32 = 1;

/// Serializes a note's content fields (id and timestamps are row-level).
pub(crate) fn encode_note(note: &Note) -> Vec<u8> {
    let envelope = NoteEnvelope {
        title: note.title.clone(),
        body: note.body.clone(),
        tags: note.tags.clone(),
        version: ENVELOPE_VERSION,
    };
    serde_json::to_vec(&envelope).expect("note envelope always serializes")
}

/// Parses an envelope. `None` on malformed JSON; the caller fills in id and
/// timestamps from the row.
pub(crate) fn decode_note(bytes: &[u8]) -> Option<Note> {
    let envelope: NoteEnvelope = serde_json::from_slice(bytes).ok()?;
    Some(Note {
        id: 0,
        title: envelope.title,
        body: envelope.body,
        tags: envelope.tags,
        created_at: 0,
        updated_at: 0,
    })
}

/// AAD binding a note ciphertext to its row: the low 32 bits of the id,
/// little-endian. Swapping blobs between rows fails authentication.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn note_aad(note_id: i64) -> [u8; 4] {
    (note_id as u32).to_le_bytes()
}

/// Preview length in characters for list and search results.
const PREVIEW_CHARS: usize = 80;

/// Head-of-body preview: the first characters of the trimmed body.
pub(crate) fn head_preview(body: &str) -> String {
    body.trim().chars().take(PREVIEW_CHARS).collect()
}

/// Search preview: a window of the body centered on a match.
///
/// `match_char_idx` and `query_chars` are in characters, not bytes.
pub(crate) fn context_preview(body: &str, match_char_idx: usize, query_chars: usize) -> String {
    let lead = PREVIEW_CHARS.saturating_sub(query_chars) / 2;
    let start = match_char_idx.saturating_sub(lead);
    let window: String = body.chars().skip(start).take(PREVIEW_CHARS).collect();
    window.trim().to_string()
}
