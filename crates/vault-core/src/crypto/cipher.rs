//! Authenticated encryption for sealed records.
//!
//! Uses XChaCha20-Poly1305 with a random 192-bit nonce. Key size:
//! 32 bytes. Nonce: 24 bytes. Tag: 16 bytes.
//!
//! Ciphertext wire format (stable, persisted):
//!
//! ```text
//! [ nonce (24 bytes) | ciphertext + tag ]
//! ```

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::crypto::key::SecretKey;
use crate::error::{Result, VaultError};

/// Nonce length in bytes.
pub const NONCE_LENGTH: usize = 24;

/// Encrypt a payload under `key`, prepending a fresh random nonce.
pub fn seal(plaintext: &[u8], key: &SecretKey) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| VaultError::Crypto("Invalid cipher key".to_string()))?;

    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| VaultError::Crypto("Encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt wire-format bytes (`nonce || ciphertext+tag`) under `key`.
///
/// A truncated input, a tampered ciphertext and a wrong key all fail the
/// same way. Callers that need "wrong passphrase" semantics map this
/// error without inspecting it.
pub fn open(sealed: &[u8], key: &SecretKey) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LENGTH {
        return Err(VaultError::Crypto("Ciphertext too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LENGTH);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| VaultError::Crypto("Invalid cipher key".to_string()))?;

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::Crypto("Decryption failed".to_string()))
}
