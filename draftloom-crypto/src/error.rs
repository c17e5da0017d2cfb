//! Error types for the encryption layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed for a structural reason (bad base64, truncated data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The AEAD tag did not verify: wrong passphrase or tampered ciphertext.
    #[error("wrong passphrase or tampered data")]
    WrongPassphrase,

    /// Envelope was produced by a newer format version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
