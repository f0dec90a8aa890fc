//! Note CRUD and search through the full stack.

mod common;

use bastion_core::{Note, NotesRepository, Vault};
use bastion_db::rusqlite::params;
use bastion_db::PageStore;
use common::TempVaultDir;

fn make_note(title: &str, body: &str, tags: &[&str]) -> Note {
    Note {
        title: title.to_string(),
        body: body.to_string(),
        tags: tags.iter().map(|t| (*t).to_string()).collect(),
        ..Note::default()
    }
}

struct Fixture {
    // Declaration order is drop order: connections close before the
    // directory is removed.
    repo: NotesRepository,
    vault: Vault,
    _tmp: TempVaultDir,
}

fn fixture(prefix: &str) -> Fixture {
    let tmp = TempVaultDir::new(prefix);
    let mut vault = Vault::new(tmp.vault_path());
    vault.create("test_password").expect("create vault");
    let repo = NotesRepository::new(&tmp.vault_path(), vault.db_subkey().expect("db subkey"))
        .expect("open repository");
    Fixture {
        repo,
        vault,
        _tmp: tmp,
    }
}

/// Rewrites `updated_at` directly so ordering tests do not depend on clock
/// granularity.
fn set_updated_at(fixture: &Fixture, id: i64, updated_at: i64) {
    let store = PageStore::open_encrypted(
        fixture.vault.path(),
        fixture.vault.db_subkey().expect("db subkey").as_bytes(),
    )
    .expect("open raw store");
    store
        .conn()
        .execute(
            "UPDATE notes SET updated_at = ?1 WHERE id = ?2",
            params![updated_at, id],
        )
        .expect("set updated_at");
}

#[test]
fn create_assigns_positive_stable_ids() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let first = fx.repo.create(&make_note("a", "", &[]), key).expect("create");
    let second = fx.repo.create(&make_note("b", "", &[]), key).expect("create");
    assert!(first > 0);
    assert!(second > first);
}

#[test]
fn round_trip() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx
        .repo
        .create(&make_note("hello", "world", &["a"]), key)
        .expect("create");

    let note = fx.repo.read(id, key).expect("read").expect("present");
    assert_eq!(note.id, id);
    assert_eq!(note.title, "hello");
    assert_eq!(note.body, "world");
    assert_eq!(note.tags, vec!["a"]);
    assert!(note.created_at > 0);
    assert_eq!(note.created_at, note.updated_at);
}

#[test]
fn read_nonexistent_is_none() {
    let fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    assert!(fx.repo.read(9999, key).expect("read").is_none());
}

#[test]
fn read_with_wrong_key_is_none() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx
        .repo
        .create(&make_note("secret", "content", &[]), key)
        .expect("create");

    // The settings subkey is a validly derived 32-byte key; it is simply not
    // the notes subkey, so the envelope must not authenticate.
    let wrong_key = fx.vault.settings_subkey().expect("settings subkey");
    assert!(fx.repo.read(id, wrong_key).expect("read").is_none());
    assert!(fx.repo.read(id, key).expect("read").is_some());
}

#[test]
fn empty_note_round_trips() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx.repo.create(&make_note("", "", &[]), key).expect("create");
    let note = fx.repo.read(id, key).expect("read").expect("present");
    assert_eq!(note.title, "");
    assert_eq!(note.body, "");
    assert!(note.tags.is_empty());
}

#[test]
fn large_note_round_trips() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let body = "0123456789abcdef".repeat(1024); // 16 KiB
    let id = fx
        .repo
        .create(&make_note("big", &body, &[]), key)
        .expect("create");
    let note = fx.repo.read(id, key).expect("read").expect("present");
    assert_eq!(note.body, body);
}

#[test]
fn unicode_note_round_trips() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let note_in = make_note("日本語タイトル", "тело заметки 📝", &["étiquette"]);
    let id = fx.repo.create(&note_in, key).expect("create");
    let note = fx.repo.read(id, key).expect("read").expect("present");
    assert_eq!(note.title, note_in.title);
    assert_eq!(note.body, note_in.body);
    assert_eq!(note.tags, note_in.tags);
}

#[test]
fn update_rewrites_content_and_timestamp() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx
        .repo
        .create(&make_note("title", "v1", &[]), key)
        .expect("create");
    set_updated_at(&fx, id, 1_000);

    let mut note = fx.repo.read(id, key).expect("read").expect("present");
    note.body = "v2".to_string();
    assert!(fx.repo.update(&note, key).expect("update"));

    let reread = fx.repo.read(id, key).expect("read").expect("present");
    assert_eq!(reread.body, "v2");
    assert!(reread.updated_at > 1_000);
    assert_eq!(reread.created_at, note.created_at);
}

#[test]
fn update_nonexistent_returns_false() {
    let fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let mut ghost = make_note("ghost", "", &[]);
    ghost.id = 4242;
    assert!(!fx.repo.update(&ghost, key).expect("update"));
}

#[test]
fn nonce_changes_on_every_update() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx
        .repo
        .create(&make_note("n", "b", &[]), key)
        .expect("create");

    let read_nonce = |fx: &Fixture| -> Vec<u8> {
        let store = PageStore::open_encrypted(
            fx.vault.path(),
            fx.vault.db_subkey().expect("db subkey").as_bytes(),
        )
        .expect("open raw store");
        store
            .conn()
            .query_row("SELECT nonce FROM notes WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .expect("read nonce")
    };

    let nonce_before = read_nonce(&fx);
    let mut note = fx.repo.read(id, key).expect("read").expect("present");
    note.body = "b2".to_string();
    fx.repo.update(&note, key).expect("update");
    let nonce_after = read_nonce(&fx);

    assert_eq!(nonce_before.len(), 24);
    assert_eq!(nonce_after.len(), 24);
    assert_ne!(nonce_before, nonce_after);
}

#[test]
fn delete_removes_the_note() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx
        .repo
        .create(&make_note("doomed", "", &[]), key)
        .expect("create");
    assert!(fx.repo.delete(id).expect("delete"));
    assert!(fx.repo.read(id, key).expect("read").is_none());
    assert!(fx.repo.list(key).expect("list").is_empty());
    assert!(!fx.repo.delete(id).expect("delete again"));
}

#[test]
fn list_returns_summaries_most_recent_first() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let older = fx
        .repo
        .create(&make_note("older", "old body", &["t1"]), key)
        .expect("create");
    let newer = fx
        .repo
        .create(&make_note("newer", "new body", &[]), key)
        .expect("create");
    set_updated_at(&fx, older, 1_000);
    set_updated_at(&fx, newer, 2_000);

    let summaries = fx.repo.list(key).expect("list");
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].title, "newer");
    assert_eq!(summaries[1].title, "older");
    assert_eq!(summaries[1].tags, vec!["t1"]);
    assert_eq!(summaries[1].preview, "old body");
}

#[test]
fn list_preview_is_truncated_to_80_chars() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let body = format!("   {}", "a".repeat(300));
    fx.repo
        .create(&make_note("long", &body, &[]), key)
        .expect("create");

    let summaries = fx.repo.list(key).expect("list");
    assert_eq!(summaries[0].preview.chars().count(), 80);
    assert!(summaries[0].preview.starts_with('a'));
}

#[test]
fn list_skips_undecryptable_rows() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    fx.repo
        .create(&make_note("good", "fine", &[]), key)
        .expect("create");
    let bad = fx
        .repo
        .create(&make_note("bad", "tampered", &[]), key)
        .expect("create");

    // Flip a ciphertext byte so the row fails authentication.
    {
        let store = PageStore::open_encrypted(
            fx.vault.path(),
            fx.vault.db_subkey().expect("db subkey").as_bytes(),
        )
        .expect("open raw store");
        let mut ciphertext: Vec<u8> = store
            .conn()
            .query_row(
                "SELECT ciphertext FROM notes WHERE id = ?1",
                params![bad],
                |row| row.get(0),
            )
            .expect("read ciphertext");
        ciphertext[0] ^= 0xFF;
        store
            .conn()
            .execute(
                "UPDATE notes SET ciphertext = ?1 WHERE id = ?2",
                params![ciphertext, bad],
            )
            .expect("write tampered ciphertext");
    }

    let summaries = fx.repo.list(key).expect("list");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].title, "good");
}

#[test]
fn list_reflects_creates_and_deletes_exactly() {
    let mut fx = fixture("bastion-notes");
    let key = fx.vault.notes_subkey().expect("subkey");
    let a = fx.repo.create(&make_note("a", "", &[]), key).expect("create");
    let b = fx.repo.create(&make_note("b", "", &[]), key).expect("create");
    let c = fx.repo.create(&make_note("c", "", &[]), key).expect("create");
    fx.repo.delete(b).expect("delete");

    let mut listed: Vec<i64> = fx.repo.list(key).expect("list").iter().map(|s| s.id).collect();
    listed.sort_unstable();
    let mut expected = vec![a, c];
    expected.sort_unstable();
    assert_eq!(listed, expected);
}

#[test]
fn notes_persist_across_reopen() {
    let tmp = TempVaultDir::new("bastion-notes");
    let id = {
        let mut vault = Vault::new(tmp.vault_path());
        vault.create("pw").expect("create vault");
        let mut repo =
            NotesRepository::new(&tmp.vault_path(), vault.db_subkey().expect("db subkey"))
                .expect("open repo");
        repo.create(
            &make_note("persist", "me", &[]),
            vault.notes_subkey().expect("subkey"),
        )
        .expect("create note")
    };

    let mut vault = Vault::new(tmp.vault_path());
    assert!(vault.unlock("pw").expect("unlock"));
    let repo = NotesRepository::new(&tmp.vault_path(), vault.db_subkey().expect("db subkey"))
        .expect("reopen repo");
    let note = repo
        .read(id, vault.notes_subkey().expect("subkey"))
        .expect("read")
        .expect("note survived reopen");
    assert_eq!(note.title, "persist");
    assert_eq!(note.body, "me");
    assert!(note.tags.is_empty());
}

#[test]
fn closed_repository_rejects_operations() {
    let mut fx = fixture("bastion-notes");
    assert!(fx.repo.is_open());
    fx.repo.close();
    assert!(!fx.repo.is_open());
    let key = fx.vault.notes_subkey().expect("subkey");
    assert!(fx.repo.read(1, key).is_err());
}

// === Search ===

#[test]
fn search_by_title_case_insensitive() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    fx.repo
        .create(&make_note("Meeting Notes", "discussed budgets", &[]), key)
        .expect("create");
    fx.repo
        .create(&make_note("Shopping List", "milk eggs bread", &[]), key)
        .expect("create");

    let results = fx.repo.search(key, "meeting").expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Meeting Notes");
}

#[test]
fn search_by_body_substring() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    fx.repo
        .create(&make_note("Note A", "the quick brown fox jumps", &[]), key)
        .expect("create");
    fx.repo
        .create(&make_note("Note B", "lazy dog sleeping", &[]), key)
        .expect("create");

    let results = fx.repo.search(key, "brown fox").expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Note A");
}

#[test]
fn search_by_tag_case_insensitive() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    fx.repo
        .create(&make_note("Work", "some content", &["project", "Urgent"]), key)
        .expect("create");
    fx.repo
        .create(&make_note("Personal", "other content", &["home"]), key)
        .expect("create");

    let results = fx.repo.search(key, "urgent").expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Work");
}

#[test]
fn short_queries_return_empty() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    fx.repo
        .create(&make_note("Test", "content", &[]), key)
        .expect("create");

    assert!(fx.repo.search(key, "").expect("search").is_empty());
    assert!(fx.repo.search(key, "x").expect("search").is_empty());
}

#[test]
fn no_match_returns_empty() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    fx.repo
        .create(&make_note("Hello", "world", &[]), key)
        .expect("create");
    assert!(fx.repo.search(key, "zzzzz").expect("search").is_empty());
}

#[test]
fn matches_sorted_most_recent_first() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    let first = fx
        .repo
        .create(&make_note("Alpha notes", "alpha content", &[]), key)
        .expect("create");
    let second = fx
        .repo
        .create(&make_note("Beta notes", "more alpha here", &[]), key)
        .expect("create");
    set_updated_at(&fx, first, 1_000);
    set_updated_at(&fx, second, 2_000);

    let results = fx.repo.search(key, "alpha").expect("search");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "Beta notes");
    assert_eq!(results[1].title, "Alpha notes");
}

#[test]
fn deleted_note_not_searchable() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    let id = fx
        .repo
        .create(&make_note("Delete Me", "findable text", &[]), key)
        .expect("create");
    fx.repo.delete(id).expect("delete");
    assert!(fx.repo.search(key, "findable").expect("search").is_empty());
}

#[test]
fn body_match_preview_contains_context() {
    let mut fx = fixture("bastion-search");
    let key = fx.vault.notes_subkey().expect("subkey");
    let body = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
                The secret keyword is hidden deep inside this long note body. \
                Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.";
    fx.repo
        .create(&make_note("Long Note", body, &[]), key)
        .expect("create");

    let results = fx.repo.search(key, "secret keyword").expect("search");
    assert_eq!(results.len(), 1);
    // A head preview would end before the match; the window must contain it.
    assert!(results[0].preview.contains("secret keyword"));
}
