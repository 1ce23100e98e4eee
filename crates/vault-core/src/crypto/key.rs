//! Key material and user-key derivation.
//!
//! Two 32-byte keys live in memory per session: the *user key*, derived
//! from the passphrase, and the *master key*, generated randomly once per
//! store. The master key is persisted only in wrapped (encrypted) form
//! inside the key-record; see [`crate::store`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::ZeroizeOnDrop;

use crate::error::{Result, VaultError};

/// Length of a secret key in bytes (256 bits).
pub const KEY_LENGTH: usize = 32;

/// A 256-bit secret key.
///
/// Key material is zeroized from memory when dropped, reducing the
/// window of exposure.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; KEY_LENGTH],
}

impl SecretKey {
    /// Create a key from raw bytes.
    ///
    /// The caller is responsible for ensuring the bytes come from a
    /// secure source.
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Generate a fresh random key from the OS RNG.
    ///
    /// Used once per store to create the master key.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { key: bytes }
    }

    /// Get a reference to the raw key bytes.
    ///
    /// Avoid storing or logging this value. Use only for immediate
    /// encryption operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Encode the key as standard base64.
    ///
    /// This is the form the master key takes inside the key-record
    /// payload, before that payload is sealed under the user key.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    /// Decode a key from standard base64.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::Crypto(format!("Invalid base64 key: {}", e)))?;
        let bytes: [u8; KEY_LENGTH] = bytes
            .try_into()
            .map_err(|_| VaultError::Crypto("Wrapped key has wrong length".to_string()))?;
        Ok(Self::from_bytes(bytes))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the user key from a passphrase.
///
/// One-way and deterministic, with no salt: equal passphrases always
/// yield equal keys, which lets a live session verify a retyped
/// passphrase by key comparison without storing the passphrase itself.
pub fn derive_user_key(passphrase: &str) -> SecretKey {
    let digest = Sha256::digest(passphrase.as_bytes());
    SecretKey::from_bytes(digest.into())
}
