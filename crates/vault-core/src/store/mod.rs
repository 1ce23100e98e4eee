//! The synchronized dual-store protocol.
//!
//! A [`Vault`] owns two SQLite connections: the durable database holding
//! the sealed table and metadata (the single source of truth), and an
//! in-memory database holding the working cache (a decrypted mirror for
//! listing and search). Every mutation writes through to both; the
//! ordering rules below keep them observably consistent even when an
//! operation dies between the two writes:
//!
//! - **delete**: the cache entry goes first. A crash mid-way leaves an
//!   orphan only in the *sealed* store, which the next full rebuild
//!   re-syncs.
//! - **insert / update / import**: the sealed write commits first. A
//!   crash mid-way leaves the cache stale, never the sealed store
//!   pointing at state that does not exist.
//! - A cache failure after a committed sealed write is still reported
//!   as an operation failure; callers retry the *read* path (the
//!   durable fact already stands), never the write.
//!
//! Session key state (`user key` + `master key`) lives behind an
//! `RwLock`: read by every request, written only inside the narrow
//! unlock / change-passphrase windows.

mod cache;
mod sealed;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, RwLock};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::Connection;

use crate::crypto::{self, derive_user_key, SecretKey};
use crate::error::{Result, VaultError};
use crate::id::ShortId;
use crate::model::{
    timestamp_now, HistoryEntry, Record, RecordWithHistory, SealedRecord, Settings,
};

/// The passphrase a store is born with. Unlocking with it must trigger a
/// "change your passphrase" warning in the caller.
pub const DEFAULT_PASSPHRASE: &str = "abc";

/// Reserved id of the key-record: the first id the allocator issues.
/// The row behind it holds the wrapped master key and is never listed
/// and never deletable.
pub const KEY_RECORD_ID: &str = "M000001";

/// Prefix for locally allocated record ids.
const ID_PREFIX: char = 'M';

/// Prefix stamped onto imported ids so they cannot collide with locally
/// allocated ones.
const IMPORT_PREFIX: char = 'i';

/// Search surface over the working cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Exact label match
    LabelOnly,
    /// Exact label match, or title substring match
    LabelAndTitle,
}

impl FromStr for SearchMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LabelOnly" => Ok(SearchMode::LabelOnly),
            "LabelAndTitle" => Ok(SearchMode::LabelAndTitle),
            other => Err(VaultError::InvalidInput(format!(
                "Unknown search mode: {}",
                other
            ))),
        }
    }
}

/// The per-session key pair. Absent until a successful unlock.
struct SessionKeys {
    user_key: SecretKey,
    master_key: SecretKey,
}

/// A single-user secret store: sealed durable table, decrypted working
/// cache, and the session key state tying them together.
pub struct Vault {
    path: PathBuf,
    durable: Mutex<Connection>,
    cache: Mutex<Connection>,
    session: RwLock<Option<SessionKeys>>,
}

impl Vault {
    /// Open (or create) the durable database at `path` and set up an
    /// empty working cache.
    ///
    /// Bootstraps the schema, the id counter and the default settings.
    /// Does not create the key-record: a fresh store must go through
    /// [`Vault::initialize_store`] once before it can be unlocked. An
    /// unreadable durable database fails here, which aborts startup.
    pub fn open(path: &Path) -> Result<Self> {
        let durable = Connection::open(path)?;
        sealed::create_schema(&durable)?;
        sealed::init_text_value(
            &durable,
            sealed::RECORD_ID_COUNTER,
            &ShortId::first(ID_PREFIX).to_string(),
        )?;
        sealed::init_text_value(
            &durable,
            sealed::SETTINGS_KEY,
            &marshal_settings(&Settings::default())?,
        )?;

        let cache_conn = Connection::open_in_memory()?;
        cache::create_schema(&cache_conn)?;

        Ok(Self {
            path: path.to_path_buf(),
            durable: Mutex::new(durable),
            cache: Mutex::new(cache_conn),
            session: RwLock::new(None),
        })
    }

    /// Path of the durable database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the key-record: generate a fresh random master key, wrap
    /// it under the user key derived from `passphrase`, and persist it
    /// under the reserved id. The session is left unlocked.
    ///
    /// Fails with [`VaultError::AlreadyInitialized`] if a key-record
    /// exists.
    pub fn initialize_store(&self, passphrase: &str) -> Result<()> {
        if passphrase.is_empty() {
            return Err(VaultError::InvalidInput(
                "Passphrase cannot be empty".to_string(),
            ));
        }

        let durable = self.lock_durable()?;
        if sealed::get_sealed(&durable, KEY_RECORD_ID)?.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }

        let user_key = derive_user_key(passphrase);
        let master_key = SecretKey::random();

        let key_record = RecordWithHistory::new(Record {
            id: KEY_RECORD_ID.to_string(),
            password: master_key.to_base64(),
            created_at: timestamp_now(),
            ..Record::default()
        });
        let row = Self::seal_bundle(&key_record, &user_key)?;
        sealed::insert_sealed(&durable, &row)?;
        drop(durable);

        let mut session = self.write_session()?;
        *session = Some(SessionKeys {
            user_key,
            master_key,
        });
        Ok(())
    }

    /// Verify a passphrase and, on first success, expose the master key
    /// for this session.
    ///
    /// When a session is already unlocked, the passphrase is checked by
    /// key comparison alone and the session state is never touched; a
    /// failed retry after a successful unlock does not discard it.
    /// Decryption failure and malformed-payload failure are both just
    /// `false`; the caller cannot tell them apart.
    pub fn unlock(&self, passphrase: &str) -> Result<bool> {
        let derived = derive_user_key(passphrase);

        {
            let session = self.read_session()?;
            if let Some(keys) = session.as_ref() {
                return Ok(keys.user_key.as_bytes() == derived.as_bytes());
            }
        }

        let row = self.key_record()?;
        match Self::unwrap_master_key(&row.secret, &derived) {
            Ok(master_key) => {
                let mut session = self.write_session()?;
                *session = Some(SessionKeys {
                    user_key: derived,
                    master_key,
                });
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Whether the store still opens with [`DEFAULT_PASSPHRASE`].
    ///
    /// Runs the probe against a throwaway derived key; live session
    /// state is never touched, whichever way the probe goes.
    pub fn is_default_passphrase(&self) -> Result<bool> {
        let row = self.key_record()?;
        let probe = derive_user_key(DEFAULT_PASSPHRASE);
        Ok(Self::unwrap_master_key(&row.secret, &probe).is_ok())
    }

    /// Re-wrap the master key under a new passphrase.
    ///
    /// The master key itself never changes; only its wrapping does, so
    /// no record is re-encrypted. The in-memory user key is swapped
    /// provisionally and rolled back if the persisted key-record write
    /// does not succeed.
    pub fn change_passphrase(&self, old: &str, new: &str) -> Result<()> {
        if old.is_empty() {
            return Err(VaultError::InvalidPassphraseChange(
                "the current passphrase is empty".to_string(),
            ));
        }
        if new.is_empty() {
            return Err(VaultError::InvalidPassphraseChange(
                "the new passphrase is empty".to_string(),
            ));
        }
        if new == old {
            return Err(VaultError::InvalidPassphraseChange(
                "the new passphrase is the same as the current one".to_string(),
            ));
        }
        if new == DEFAULT_PASSPHRASE {
            return Err(VaultError::InvalidPassphraseChange(format!(
                "cannot set the passphrase to the default value {:?}",
                DEFAULT_PASSPHRASE
            )));
        }

        let row = self.key_record()?;
        let old_key = derive_user_key(old);
        let mut key_record = Self::open_bundle(&row.secret, &old_key)
            .map_err(|_| VaultError::WrongPassphrase)?;
        let master_key = SecretKey::from_base64(&key_record.record.password)
            .map_err(|_| VaultError::WrongPassphrase)?;

        let new_key = derive_user_key(new);
        key_record.record.modified_at = timestamp_now();

        // Provisional swap: hold the write lock across the durable
        // write so no reader observes a half-updated key pair, and
        // restore the previous state on any failure.
        let mut session = self.write_session()?;
        let previous = session.take();
        *session = Some(SessionKeys {
            user_key: new_key.clone(),
            master_key: master_key.clone(),
        });

        let result = Self::seal_bundle(&key_record, &new_key).and_then(|sealed_row| {
            let durable = self.lock_durable()?;
            sealed::update_sealed(&durable, &sealed_row)
        });
        if let Err(err) = result {
            *session = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Rebuild the working cache from the sealed store.
    ///
    /// No-op when the cache already holds at least one record. The
    /// rebuild is all-or-nothing: every sealed record is decrypted
    /// before anything is loaded, so a single failure leaves the cache
    /// empty rather than partially populated.
    pub fn rebuild_cache(&self) -> Result<()> {
        let master_key = self.master_key()?;
        let durable = self.lock_durable()?;
        let mut cache_conn = self.lock_cache()?;

        if cache::count_records(&cache_conn)? > 0 {
            return Ok(());
        }

        let rows = sealed::all_sealed_except(&durable, KEY_RECORD_ID)?;
        drop(durable);

        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            bundles.push(Self::open_bundle(&row.secret, &master_key)?);
        }

        let tx = cache_conn.transaction()?;
        for bundle in &bundles {
            cache::insert_bundle(&tx, bundle)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Forget the session keys and drop every cached row.
    ///
    /// The sealed store is untouched; the next unlock plus
    /// [`Vault::rebuild_cache`] restores the working set.
    pub fn sign_out(&self) -> Result<()> {
        let cache_conn = self.lock_cache()?;
        cache::clear(&cache_conn)?;
        drop(cache_conn);

        let mut session = self.write_session()?;
        *session = None;
        Ok(())
    }

    /// Insert a new record, returning its freshly allocated id.
    ///
    /// The id allocation and the sealed insert share one durable
    /// transaction; the cache write follows the commit.
    pub fn insert(&self, mut record: Record) -> Result<String> {
        let master_key = self.master_key()?;

        let mut durable = self.lock_durable()?;
        let tx = durable.transaction()?;
        record.id = sealed::next_id(&tx)?.to_string();
        if record.created_at == 0 {
            record.created_at = timestamp_now();
        }
        if record.modified_at == 0 {
            record.modified_at = record.created_at;
        }

        let bundle = RecordWithHistory::new(record.clone());
        let row = Self::seal_bundle(&bundle, &master_key)?;
        sealed::insert_sealed(&tx, &row)?;
        tx.commit()?;
        drop(durable);

        let cache_conn = self.lock_cache()?;
        cache::insert_record(&cache_conn, &record)?;
        Ok(record.id)
    }

    /// Overwrite a record's mutable fields, appending one history
    /// snapshot of the values being displaced.
    ///
    /// `created_at` is preserved from the stored record; `modified_at`
    /// becomes now, and the snapshot carries the same stamp. Concurrent
    /// updates to the same id are not serialized here: last write wins
    /// at the storage engine's row granularity.
    pub fn update(&self, record: Record) -> Result<()> {
        if record.id == KEY_RECORD_ID {
            return Err(VaultError::NotFound(record.id));
        }
        let master_key = self.master_key()?;

        let durable = self.lock_durable()?;
        let row = sealed::get_sealed(&durable, &record.id)?
            .ok_or_else(|| VaultError::NotFound(record.id.clone()))?;
        let mut bundle = Self::open_bundle(&row.secret, &master_key)?;

        let now = timestamp_now();
        let snapshot = HistoryEntry::snapshot(&bundle.record, now);
        bundle.history.push(snapshot.clone());

        let mut updated = record;
        updated.created_at = bundle.record.created_at;
        updated.modified_at = now;
        bundle.record = updated.clone();

        let sealed_row = Self::seal_bundle(&bundle, &master_key)?;

        let mut cache_conn = self.lock_cache()?;
        let tx = cache_conn.transaction()?;
        cache::update_record(&tx, &updated)?;
        cache::insert_history(&tx, &snapshot)?;
        // Durable write commits before the cache transaction does.
        sealed::update_sealed(&durable, &sealed_row)?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a record; its history goes with it.
    ///
    /// The key-record id is rejected outright. The cache entry is
    /// removed before the sealed one.
    pub fn delete(&self, id: &str) -> Result<()> {
        if id == KEY_RECORD_ID {
            return Err(VaultError::InvalidInput(
                "the key-record cannot be deleted".to_string(),
            ));
        }

        let durable = self.lock_durable()?;
        let mut cache_conn = self.lock_cache()?;
        let tx = cache_conn.transaction()?;
        cache::delete_record(&tx, id)?;
        if sealed::delete_sealed(&durable, id)? == 0 {
            // Cache transaction rolls back on drop.
            return Err(VaultError::NotFound(id.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a single history snapshot.
    ///
    /// The owning record is found through the cache's history index; if
    /// the sealed bundle then turns out not to contain the entry, the
    /// two stores have desynchronized and the error says so; a full
    /// rebuild is the mitigation.
    pub fn delete_history(&self, history_id: &str) -> Result<()> {
        let master_key = self.master_key()?;

        let durable = self.lock_durable()?;
        let mut cache_conn = self.lock_cache()?;

        let record_id = cache::record_id_of_history(&cache_conn, history_id)?
            .ok_or_else(|| VaultError::NotFound(history_id.to_string()))?;
        let row = sealed::get_sealed(&durable, &record_id)?.ok_or_else(|| {
            VaultError::Consistency(format!(
                "history {} is indexed under record {}, which is missing from the sealed store",
                history_id, record_id
            ))
        })?;
        let mut bundle = Self::open_bundle(&row.secret, &master_key)?;

        let position = bundle
            .history
            .iter()
            .position(|entry| entry.id == history_id)
            .ok_or_else(|| {
                VaultError::Consistency(format!(
                    "history {} is indexed in the cache but absent from sealed bundle {}",
                    history_id, record_id
                ))
            })?;
        bundle.history.remove(position);

        let sealed_row = Self::seal_bundle(&bundle, &master_key)?;
        let tx = cache_conn.transaction()?;
        cache::delete_history(&tx, history_id)?;
        sealed::update_sealed(&durable, &sealed_row)?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch one record with its full history, straight from the
    /// sealed store.
    pub fn get(&self, id: &str) -> Result<RecordWithHistory> {
        if id == KEY_RECORD_ID {
            return Err(VaultError::NotFound(id.to_string()));
        }
        let master_key = self.master_key()?;

        let durable = self.lock_durable()?;
        let row = sealed::get_sealed(&durable, id)?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;
        drop(durable);

        Self::open_bundle(&row.secret, &master_key)
    }

    /// All records from the working cache, passwords redacted, notes
    /// and history omitted.
    pub fn list_all(&self) -> Result<Vec<Record>> {
        let cache_conn = self.lock_cache()?;
        cache::all_simple(&cache_conn)
    }

    /// Search the working cache. Passwords come back redacted.
    pub fn search(&self, pattern: &str, mode: SearchMode) -> Result<Vec<Record>> {
        let cache_conn = self.lock_cache()?;
        match mode {
            SearchMode::LabelOnly => cache::by_label(&cache_conn, pattern),
            SearchMode::LabelAndTitle => cache::by_label_and_title(&cache_conn, pattern),
        }
    }

    /// The real password of one record, from the working cache.
    pub fn reveal_password(&self, id: &str) -> Result<String> {
        let cache_conn = self.lock_cache()?;
        cache::password_of(&cache_conn, id)?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))
    }

    /// Number of records in the working cache.
    pub fn count(&self) -> Result<i64> {
        let cache_conn = self.lock_cache()?;
        cache::count_records(&cache_conn)
    }

    /// Import foreign bundles as one failure unit.
    ///
    /// Every incoming id is re-prefixed before its history entries are
    /// re-stamped with the owning-record reference, and each bundle is
    /// sealed only after the rewrite; sealing earlier would persist
    /// stale cross-references. Any single failure aborts the whole
    /// batch with nothing persisted.
    pub fn import(&self, items: Vec<RecordWithHistory>) -> Result<()> {
        let master_key = self.master_key()?;

        let mut durable = self.lock_durable()?;
        let mut cache_conn = self.lock_cache()?;
        let durable_tx = durable.transaction()?;
        let cache_tx = cache_conn.transaction()?;

        for mut bundle in items {
            if bundle.record.id.is_empty() {
                return Err(VaultError::InvalidInput(
                    "import item is missing an id".to_string(),
                ));
            }
            bundle.record.id = format!("{}{}", IMPORT_PREFIX, bundle.record.id);
            for entry in &mut bundle.history {
                entry.record_id = bundle.record.id.clone();
            }

            cache::insert_bundle(&cache_tx, &bundle)?;
            let row = Self::seal_bundle(&bundle, &master_key)?;
            sealed::insert_sealed(&durable_tx, &row)?;
        }

        // The durable fact commits first.
        durable_tx.commit()?;
        cache_tx.commit()?;
        Ok(())
    }

    /// Application settings from the metadata table.
    pub fn settings(&self) -> Result<Settings> {
        let durable = self.lock_durable()?;
        let encoded = sealed::get_text_value(&durable, sealed::SETTINGS_KEY)?
            .ok_or_else(|| VaultError::Storage("Settings metadata missing".to_string()))?;
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::Storage(format!("Invalid settings encoding: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn update_settings(&self, settings: &Settings) -> Result<()> {
        let durable = self.lock_durable()?;
        sealed::update_text_value(&durable, sealed::SETTINGS_KEY, &marshal_settings(settings)?)
    }

    // --- internals ---

    fn lock_durable(&self) -> Result<MutexGuard<'_, Connection>> {
        self.durable
            .lock()
            .map_err(|_| VaultError::Storage("Durable connection poisoned".to_string()))
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, Connection>> {
        self.cache
            .lock()
            .map_err(|_| VaultError::Storage("Cache connection poisoned".to_string()))
    }

    fn read_session(&self) -> Result<std::sync::RwLockReadGuard<'_, Option<SessionKeys>>> {
        self.session
            .read()
            .map_err(|_| VaultError::Storage("Session lock poisoned".to_string()))
    }

    fn write_session(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<SessionKeys>>> {
        self.session
            .write()
            .map_err(|_| VaultError::Storage("Session lock poisoned".to_string()))
    }

    /// Clone the session master key, or fail if no session is unlocked.
    fn master_key(&self) -> Result<SecretKey> {
        let session = self.read_session()?;
        session
            .as_ref()
            .map(|keys| keys.master_key.clone())
            .ok_or(VaultError::Locked)
    }

    fn key_record(&self) -> Result<SealedRecord> {
        let durable = self.lock_durable()?;
        sealed::get_sealed(&durable, KEY_RECORD_ID)?.ok_or_else(|| {
            VaultError::Storage("Sealed store holds no key-record; initialize it first".to_string())
        })
    }

    fn seal_bundle(bundle: &RecordWithHistory, key: &SecretKey) -> Result<SealedRecord> {
        let payload = serde_json::to_vec(bundle)?;
        Ok(SealedRecord {
            id: bundle.record.id.clone(),
            secret: crypto::seal(&payload, key)?,
        })
    }

    fn open_bundle(secret: &[u8], key: &SecretKey) -> Result<RecordWithHistory> {
        let payload = crypto::open(secret, key)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Unwrap the master key from the key-record ciphertext.
    ///
    /// Decryption and deserialization failures both collapse into
    /// [`VaultError::WrongPassphrase`] so the caller cannot use the
    /// error as an oracle.
    fn unwrap_master_key(secret: &[u8], user_key: &SecretKey) -> Result<SecretKey> {
        let bundle = Self::open_bundle(secret, user_key).map_err(|_| VaultError::WrongPassphrase)?;
        SecretKey::from_base64(&bundle.record.password).map_err(|_| VaultError::WrongPassphrase)
    }
}

fn marshal_settings(settings: &Settings) -> Result<String> {
    Ok(BASE64.encode(serde_json::to_vec(settings)?))
}
