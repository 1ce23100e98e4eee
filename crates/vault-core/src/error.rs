//! Error types for vault core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Errors are descriptive at the core level; the CLI layer will map these
//! to user-friendly messages.

use thiserror::Error;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Core error type for vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The sealed store already holds a key-record
    #[error("Store is already initialized")]
    AlreadyInitialized,

    /// Authenticated decryption of the key-record failed.
    ///
    /// Deliberately covers both decryption failure and malformed-payload
    /// failure so callers cannot distinguish the two.
    #[error("Wrong passphrase")]
    WrongPassphrase,

    /// An operation needed the master key but no session is unlocked
    #[error("Vault is locked")]
    Locked,

    /// Record or history entry not found by id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected passphrase change (empty, unchanged, or default)
    #[error("Invalid passphrase change: {0}")]
    InvalidPassphraseChange(String),

    /// The sealed store and the working cache disagree.
    ///
    /// Reported, never silently repaired; the mitigating full cache
    /// rebuild is the caller's explicit next step.
    #[error("Store consistency error: {0}")]
    Consistency(String),

    /// Encryption or decryption error
    #[error("Encryption error: {0}")]
    Crypto(String),

    /// Storage backend error (generic)
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite-specific storage error
    #[error("SQLite error: {source}")]
    Sqlite {
        #[from]
        source: rusqlite::Error,
    },

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}
