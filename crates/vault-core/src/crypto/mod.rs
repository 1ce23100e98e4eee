//! Cryptographic operations for the vault.
//!
//! This module provides the authenticated cipher and the key hierarchy
//! leaves:
//! - **XChaCha20-Poly1305**: authenticated encryption with a random
//!   24-byte nonce prepended to every ciphertext
//! - **SHA-256**: deterministic, salt-free user-key derivation
//! - Key material zeroized from memory on drop
//!
//! ## Security Model
//!
//! Envelope encryption: every record is sealed under a random *master
//! key*; the master key is itself sealed under the *user key* derived
//! from the passphrase, and only that wrapped form is ever persisted.
//! Changing the passphrase re-wraps the master key without touching
//! the bulk of the data.
//!
//! We defend against theft of the sealed store file and tampering with
//! its rows. We do NOT defend against a compromised OS or access to an
//! unlocked session's memory.

pub mod cipher;
pub mod key;

pub use cipher::{open, seal, NONCE_LENGTH};
pub use key::{derive_user_key, SecretKey, KEY_LENGTH};
