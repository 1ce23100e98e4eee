//! Core data types for the secret store.
//!
//! A [`RecordWithHistory`] is the unit of encryption: one record plus its
//! ordered history snapshots, serialized as JSON and sealed as a whole.
//! The working cache stores records (and a history index) in plaintext
//! but never the sealed bundle itself.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Placeholder returned in place of real passwords by listings, so the
/// caller can tell a password exists without seeing it.
pub const REDACTED_PASSWORD: &str = "******";

/// Current unix time in seconds.
pub fn timestamp_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A secret record.
///
/// `id` is assigned once and immutable; `created_at` is immutable after
/// creation; `modified_at` is updated on every edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Short counter id (see [`crate::id::ShortId`])
    pub id: String,

    /// Display title
    pub title: String,

    /// Free-form grouping label
    pub label: String,

    /// Account username
    pub username: String,

    /// The secret itself
    pub password: String,

    /// Free-text notes
    pub notes: String,

    /// Creation time (unix seconds)
    pub created_at: i64,

    /// Last modification time (unix seconds)
    pub modified_at: i64,
}

/// A snapshot of a record's mutable fields, taken immediately before an
/// edit overwrites them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Random id, unrelated to the record id namespace
    pub id: String,

    /// Owning record id
    pub record_id: String,

    pub title: String,
    pub username: String,
    pub password: String,
    pub notes: String,

    /// When this snapshot was taken (unix seconds)
    pub created_at: i64,
}

impl HistoryEntry {
    /// Snapshot the mutable fields of `record` as they are right now.
    ///
    /// `created_at` is the moment of the edit that displaces these
    /// values, i.e. the new `modified_at` of the record.
    pub fn snapshot(record: &Record, created_at: i64) -> Self {
        Self {
            id: random_history_id(),
            record_id: record.id.clone(),
            title: record.title.clone(),
            username: record.username.clone(),
            password: record.password.clone(),
            notes: record.notes.clone(),
            created_at,
        }
    }
}

/// The unit of encryption: one record plus its ordered history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordWithHistory {
    pub record: Record,

    /// Snapshots ordered by creation time, oldest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl RecordWithHistory {
    /// Wrap a record with no history yet.
    pub fn new(record: Record) -> Self {
        Self {
            record,
            history: Vec::new(),
        }
    }
}

/// A row of the sealed table: an id and an encrypted bundle.
#[derive(Debug, Clone)]
pub struct SealedRecord {
    pub id: String,

    /// `nonce || ciphertext+tag` over the serialized bundle
    pub secret: Vec<u8>,
}

/// Application settings, stored alongside the id counter in the
/// metadata table. Not secret, but they live in the sealed store's
/// database for simplicity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Address the serving layer binds to
    pub app_addr: String,

    /// Whether the serving layer simulates latency in debug builds
    pub delay: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_addr: "127.0.0.1:80".to_string(),
            delay: true,
        }
    }
}

/// Random id for a history snapshot: 16 hex digits with an `h` prefix,
/// so it can never collide with the record id namespace.
fn random_history_id() -> String {
    format!("h{:016x}", rand::random::<u64>())
}
