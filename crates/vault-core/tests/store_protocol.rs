//! End-to-end tests for the dual-store protocol: key hierarchy,
//! write-through ordering, history, and import.

use tempfile::TempDir;

use vault_core::{
    Record, RecordWithHistory, SearchMode, Settings, Vault, VaultError, DEFAULT_PASSPHRASE,
    KEY_RECORD_ID,
};

struct TestVault {
    vault: Vault,
    // Held for the lifetime of the test; the directory is removed on drop.
    _dir: TempDir,
}

impl std::ops::Deref for TestVault {
    type Target = Vault;

    fn deref(&self) -> &Vault {
        &self.vault
    }
}

/// A store initialized with the default passphrase, session unlocked.
fn open_default() -> TestVault {
    let dir = TempDir::new().expect("temp dir should be created");
    let vault = Vault::open(&dir.path().join("store.db")).expect("open should succeed");
    vault
        .initialize_store(DEFAULT_PASSPHRASE)
        .expect("initialize should succeed");
    TestVault { vault, _dir: dir }
}

fn new_record(title: &str, label: &str, username: &str, password: &str) -> Record {
    Record {
        title: title.to_string(),
        label: label.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        notes: String::new(),
        ..Record::default()
    }
}

#[test]
fn test_default_passphrase_lifecycle() {
    let vault = open_default();
    assert!(vault.is_default_passphrase().unwrap());

    vault
        .change_passphrase(DEFAULT_PASSPHRASE, "xyz123")
        .expect("change should succeed");
    assert!(!vault.is_default_passphrase().unwrap());

    vault.sign_out().unwrap();
    assert!(!vault.unlock(DEFAULT_PASSPHRASE).unwrap());
    assert!(vault.unlock("xyz123").unwrap());
}

#[test]
fn test_change_passphrase_keeps_master_key() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();

    vault
        .change_passphrase(DEFAULT_PASSPHRASE, "xyz123")
        .unwrap();
    vault.sign_out().unwrap();
    assert!(vault.unlock("xyz123").unwrap());
    vault.rebuild_cache().unwrap();

    // Records sealed before the change still open: the master key is
    // unchanged, only its wrapping moved.
    let bundle = vault.get(&id).unwrap();
    assert_eq!(bundle.record.username, "alice");
    assert_eq!(vault.reveal_password(&id).unwrap(), "hunter2");
}

#[test]
fn test_change_passphrase_validation() {
    let vault = open_default();

    for (old, new) in [
        ("", "xyz123"),
        (DEFAULT_PASSPHRASE, ""),
        (DEFAULT_PASSPHRASE, DEFAULT_PASSPHRASE),
        ("whatever", DEFAULT_PASSPHRASE),
    ] {
        assert!(matches!(
            vault.change_passphrase(old, new),
            Err(VaultError::InvalidPassphraseChange(_))
        ));
    }

    assert!(matches!(
        vault.change_passphrase("not-the-passphrase", "xyz123"),
        Err(VaultError::WrongPassphrase)
    ));

    // All the failures above left the session intact.
    assert!(vault.unlock(DEFAULT_PASSPHRASE).unwrap());
}

#[test]
fn test_initialize_twice_fails() {
    let vault = open_default();
    assert!(matches!(
        vault.initialize_store("another"),
        Err(VaultError::AlreadyInitialized)
    ));
}

#[test]
fn test_failed_unlock_keeps_session() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();

    // A failed retry after a successful unlock must not discard state.
    assert!(!vault.unlock("wrong-passphrase").unwrap());
    assert_eq!(vault.get(&id).unwrap().record.title, "bank");
}

#[test]
fn test_locked_vault_rejects_operations() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::open(&dir.path().join("store.db")).unwrap();
    vault.initialize_store(DEFAULT_PASSPHRASE).unwrap();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();
    drop(vault);

    // Fresh process, not yet unlocked.
    let vault = Vault::open(&dir.path().join("store.db")).unwrap();
    assert!(matches!(vault.get(&id), Err(VaultError::Locked)));
    assert!(matches!(
        vault.insert(new_record("x", "", "", "")),
        Err(VaultError::Locked)
    ));
    assert!(matches!(vault.rebuild_cache(), Err(VaultError::Locked)));
}

#[test]
fn test_first_insert_id_and_redacted_listing() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();

    // The key-record consumed M000001.
    assert_eq!(id, "M000002");

    let all = vault.list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "M000002");
    assert_eq!(all[0].password, "******");
}

#[test]
fn test_ids_strictly_increasing_across_inserts() {
    let vault = open_default();
    let mut previous = String::new();
    for i in 0..10 {
        let id = vault
            .insert(new_record(&format!("site-{}", i), "", "", ""))
            .unwrap();
        assert!(id > previous, "{} should sort after {}", id, previous);
        previous = id;
    }
}

#[test]
fn test_update_appends_history_snapshot() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();

    let mut edited = vault.get(&id).unwrap().record;
    edited.username = "alice2".to_string();
    vault.update(edited).unwrap();

    let bundle = vault.get(&id).unwrap();
    assert_eq!(bundle.record.username, "alice2");
    assert_eq!(bundle.history.len(), 1);

    // The snapshot holds the pre-update values.
    let snapshot = &bundle.history[0];
    assert_eq!(snapshot.username, "alice");
    assert_eq!(snapshot.password, "hunter2");
    assert_eq!(snapshot.record_id, id);
    assert_eq!(snapshot.created_at, bundle.record.modified_at);
}

#[test]
fn test_update_preserves_created_at() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();
    let created_at = vault.get(&id).unwrap().record.created_at;

    let mut edited = vault.get(&id).unwrap().record;
    edited.created_at = 1; // must be ignored
    edited.title = "bank (new)".to_string();
    vault.update(edited).unwrap();

    let bundle = vault.get(&id).unwrap();
    assert_eq!(bundle.record.created_at, created_at);
    assert_eq!(bundle.record.title, "bank (new)");
}

#[test]
fn test_update_missing_record_is_not_found() {
    let vault = open_default();
    let mut record = new_record("ghost", "", "", "");
    record.id = "M999999".to_string();
    assert!(matches!(
        vault.update(record),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_delete_history_entry_leaves_record() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();

    let mut edited = vault.get(&id).unwrap().record;
    edited.username = "alice2".to_string();
    vault.update(edited).unwrap();

    let history_id = vault.get(&id).unwrap().history[0].id.clone();
    vault.delete_history(&history_id).unwrap();

    let bundle = vault.get(&id).unwrap();
    assert!(bundle.history.is_empty());
    assert_eq!(bundle.record.username, "alice2");
}

#[test]
fn test_delete_history_unknown_id_is_not_found() {
    let vault = open_default();
    assert!(matches!(
        vault.delete_history("h0123456789abcdef"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_delete_record_cascades_history() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();
    let mut edited = vault.get(&id).unwrap().record;
    edited.password = "hunter3".to_string();
    vault.update(edited).unwrap();

    vault.delete(&id).unwrap();
    assert!(matches!(vault.get(&id), Err(VaultError::NotFound(_))));
    assert!(vault.list_all().unwrap().is_empty());
    assert_eq!(vault.count().unwrap(), 0);
}

#[test]
fn test_delete_missing_record_is_not_found() {
    let vault = open_default();
    assert!(matches!(
        vault.delete("M999999"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_key_record_is_fenced_off() {
    let vault = open_default();
    vault.insert(new_record("bank", "finance", "alice", "x")).unwrap();

    // Not listable, not gettable, not deletable.
    assert!(vault
        .list_all()
        .unwrap()
        .iter()
        .all(|record| record.id != KEY_RECORD_ID));
    assert!(matches!(
        vault.get(KEY_RECORD_ID),
        Err(VaultError::NotFound(_))
    ));
    assert!(matches!(
        vault.delete(KEY_RECORD_ID),
        Err(VaultError::InvalidInput(_))
    ));
}

#[test]
fn test_cache_and_sealed_store_agree() {
    let vault = open_default();
    let a = vault.insert(new_record("one", "l", "u", "p")).unwrap();
    let b = vault.insert(new_record("two", "l", "u", "p")).unwrap();
    let c = vault.insert(new_record("three", "l", "u", "p")).unwrap();

    let mut edited = vault.get(&b).unwrap().record;
    edited.notes = "edited".to_string();
    vault.update(edited).unwrap();
    vault.delete(&a).unwrap();

    let mut listed: Vec<String> = vault
        .list_all()
        .unwrap()
        .into_iter()
        .map(|record| record.id)
        .collect();
    listed.sort();
    assert_eq!(listed, vec![b.clone(), c.clone()]);

    // Every listed id resolves in the sealed store, and the deleted one
    // does not.
    for id in [&b, &c] {
        assert!(vault.get(id).is_ok());
    }
    assert!(vault.get(&a).is_err());
}

#[test]
fn test_rebuild_after_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");

    let vault = Vault::open(&path).unwrap();
    vault.initialize_store(DEFAULT_PASSPHRASE).unwrap();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();
    let mut edited = vault.get(&id).unwrap().record;
    edited.username = "alice2".to_string();
    vault.update(edited).unwrap();
    drop(vault);

    let vault = Vault::open(&path).unwrap();
    assert!(vault.unlock(DEFAULT_PASSPHRASE).unwrap());
    assert_eq!(vault.count().unwrap(), 0);

    vault.rebuild_cache().unwrap();
    assert_eq!(vault.count().unwrap(), 1);
    assert_eq!(vault.list_all().unwrap()[0].username, "alice2");

    // The history index came back too.
    let history_id = vault.get(&id).unwrap().history[0].id.clone();
    vault.delete_history(&history_id).unwrap();
    assert!(vault.get(&id).unwrap().history.is_empty());

    // Re-entrant rebuild is a no-op, not a duplication.
    vault.rebuild_cache().unwrap();
    assert_eq!(vault.count().unwrap(), 1);
}

#[test]
fn test_search_modes() {
    let vault = open_default();
    vault
        .insert(new_record("bank login", "finance", "alice", "p"))
        .unwrap();
    vault
        .insert(new_record("finance blog", "web", "bob", "p"))
        .unwrap();

    let label_only = vault.search("finance", SearchMode::LabelOnly).unwrap();
    assert_eq!(label_only.len(), 1);
    assert_eq!(label_only[0].title, "bank login");

    let both = vault.search("finance", SearchMode::LabelAndTitle).unwrap();
    assert_eq!(both.len(), 2);

    assert!(vault
        .search("nothing", SearchMode::LabelAndTitle)
        .unwrap()
        .is_empty());
}

#[test]
fn test_import_disambiguates_colliding_ids() {
    let vault = open_default();
    let local_id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();
    assert_eq!(local_id, "M000002");

    // Foreign bundle whose id collides with the local one.
    let mut foreign = RecordWithHistory::new(new_record("other bank", "web", "bob", "secret"));
    foreign.record.id = "M000002".to_string();
    let mut snapshot = vault_core::HistoryEntry::snapshot(&foreign.record, 42);
    snapshot.record_id = "M000002".to_string();
    foreign.history.push(snapshot);

    vault.import(vec![foreign]).unwrap();

    let imported = vault.get("iM000002").unwrap();
    assert_eq!(imported.record.title, "other bank");
    assert_eq!(imported.history.len(), 1);
    // History references the disambiguated id, not the original.
    assert_eq!(imported.history[0].record_id, "iM000002");

    // The local record is untouched.
    assert_eq!(vault.get(&local_id).unwrap().record.title, "bank");
    assert_eq!(vault.count().unwrap(), 2);
}

#[test]
fn test_import_batch_is_one_failure_unit() {
    let vault = open_default();

    let first = RecordWithHistory::new(Record {
        id: "X000001".to_string(),
        title: "ok".to_string(),
        ..Record::default()
    });
    // Same id twice: the second insert violates the primary key.
    let duplicate = first.clone();

    assert!(vault.import(vec![first, duplicate]).is_err());

    // Nothing from the batch persisted, in either store.
    assert_eq!(vault.count().unwrap(), 0);
    assert!(vault.get("iX000001").is_err());
}

#[test]
fn test_import_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");

    let vault = Vault::open(&path).unwrap();
    vault.initialize_store(DEFAULT_PASSPHRASE).unwrap();
    let bundle = RecordWithHistory::new(Record {
        id: "A7".to_string(),
        title: "imported".to_string(),
        ..Record::default()
    });
    vault.import(vec![bundle]).unwrap();
    drop(vault);

    let vault = Vault::open(&path).unwrap();
    assert!(vault.unlock(DEFAULT_PASSPHRASE).unwrap());
    vault.rebuild_cache().unwrap();
    assert_eq!(vault.get("iA7").unwrap().record.title, "imported");
}

#[test]
fn test_reveal_password_returns_real_value() {
    let vault = open_default();
    let id = vault
        .insert(new_record("bank", "finance", "alice", "hunter2"))
        .unwrap();

    assert_eq!(vault.reveal_password(&id).unwrap(), "hunter2");
    assert!(matches!(
        vault.reveal_password("M999999"),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn test_settings_round_trip() {
    let vault = open_default();
    assert_eq!(vault.settings().unwrap(), Settings::default());

    let custom = Settings {
        app_addr: "127.0.0.1:8080".to_string(),
        delay: false,
    };
    vault.update_settings(&custom).unwrap();
    assert_eq!(vault.settings().unwrap(), custom);

    // Settings survive without a counter reset.
    let id = vault.insert(new_record("t", "", "", "")).unwrap();
    assert_eq!(id, "M000002");
}
