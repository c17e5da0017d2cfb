//! The ciphertext envelope that travels to the remote store.
//!
//! A sealed envelope is a small JSON object: format version, the KDF salt,
//! and the base64-framed nonce+ciphertext. The salt rides along so any
//! device holding the passphrase can re-derive the key; nothing in the
//! envelope reveals the plaintext or the passphrase.

use crate::cipher::{self, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{derive_key, KdfParams, Salt, SALT_SIZE};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// JSON-serializable ciphertext envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Envelope format version.
    pub version: u8,
    /// Base64-encoded KDF salt.
    pub salt: String,
    /// Base64-encoded nonce + ciphertext.
    pub body: String,
}

/// Seals `plaintext` under a key derived from `passphrase`, using default
/// KDF parameters. A fresh salt and nonce are generated per call.
pub fn seal(passphrase: &str, plaintext: &[u8]) -> CryptoResult<SnapshotEnvelope> {
    seal_with_params(passphrase, plaintext, &KdfParams::default())
}

/// Seals with explicit KDF parameters (tests use the fast preset).
pub fn seal_with_params(
    passphrase: &str,
    plaintext: &[u8],
    params: &KdfParams,
) -> CryptoResult<SnapshotEnvelope> {
    let salt = Salt::random();
    let key = derive_key(passphrase, &salt, params)?;
    let encrypted = cipher::encrypt(&key, plaintext)?;

    Ok(SnapshotEnvelope {
        version: ENVELOPE_VERSION,
        salt: STANDARD.encode(salt.as_bytes()),
        body: encrypted.to_base64(),
    })
}

/// Opens an envelope with the given passphrase.
///
/// Returns [`CryptoError::WrongPassphrase`] when the AEAD tag does not
/// verify, and [`CryptoError::Decryption`] for structural problems
/// (bad base64, truncated body).
pub fn open(passphrase: &str, envelope: &SnapshotEnvelope) -> CryptoResult<Vec<u8>> {
    open_with_params(passphrase, envelope, &KdfParams::default())
}

/// Opens with explicit KDF parameters, which must match those used to seal.
pub fn open_with_params(
    passphrase: &str,
    envelope: &SnapshotEnvelope,
    params: &KdfParams,
) -> CryptoResult<Vec<u8>> {
    if envelope.version > ENVELOPE_VERSION {
        return Err(CryptoError::UnsupportedVersion(envelope.version));
    }

    let salt_bytes = STANDARD
        .decode(&envelope.salt)
        .map_err(|e| CryptoError::Decryption(format!("invalid salt: {e}")))?;
    if salt_bytes.len() != SALT_SIZE {
        return Err(CryptoError::Decryption(format!(
            "invalid salt length: {}",
            salt_bytes.len()
        )));
    }
    let mut salt_array = [0u8; SALT_SIZE];
    salt_array.copy_from_slice(&salt_bytes);
    let salt = Salt::from_bytes(salt_array);

    let key = derive_key(passphrase, &salt, params)?;
    let encrypted = EncryptedData::from_base64(&envelope.body)?;
    cipher::decrypt(&key, &encrypted)
}
