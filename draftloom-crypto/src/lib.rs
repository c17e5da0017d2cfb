//! Passphrase-based encryption for Draftloom project snapshots.
//!
//! Every snapshot leaves the device as ciphertext. The wire format is the
//! [`SnapshotEnvelope`]: a JSON object carrying the KDF salt and the
//! base64-framed nonce+ciphertext, so any device holding the passphrase
//! can re-derive the key and open it.
//!
//! - `key`: Argon2id key derivation from the user's passphrase
//! - `cipher`: ChaCha20-Poly1305 AEAD over raw bytes
//! - `envelope`: seal/open of the JSON envelope that travels to the cloud

pub mod cipher;
pub mod envelope;
mod error;
pub mod key;

pub use cipher::{EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use envelope::{open, open_with_params, seal, seal_with_params, SnapshotEnvelope, ENVELOPE_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, KdfParams, Salt, KEY_SIZE, SALT_SIZE};
