//! # Vault Core
//!
//! Core library for a single-user secret store: records (title,
//! username, password, notes) held under authenticated envelope
//! encryption, gated by a passphrase, with a fast decrypted query
//! surface while a session is unlocked.
//!
//! ## Architecture
//!
//! - **crypto**: authenticated cipher and the two-level key hierarchy
//!   (user key wraps master key; master key seals everything else)
//! - **model**: records, history snapshots and the sealed bundle shape
//! - **id**: short monotonically increasing record identifiers
//! - **store**: the sealed durable table, the in-memory working cache,
//!   and the sync protocol keeping the two in agreement
//!
//! The HTTP/session layer, lockout policy and asset serving live with
//! the caller; this crate assumes requests arrive identity-verified.

pub mod crypto;
pub mod error;
pub mod id;
pub mod model;
pub mod store;

pub use error::{Result, VaultError};
pub use model::{HistoryEntry, Record, RecordWithHistory, SealedRecord, Settings};
pub use store::{SearchMode, Vault, DEFAULT_PASSPHRASE, KEY_RECORD_ID};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
