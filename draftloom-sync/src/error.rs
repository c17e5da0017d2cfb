//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connect was attempted without a passphrase.
    #[error("a passphrase is required to connect")]
    PassphraseRequired,

    /// No OAuth client identifier is configured.
    #[error("no OAuth client id configured")]
    MissingClientId,

    /// OAuth flow failed (code exchange, consent, scope).
    #[error("oauth failed: {0}")]
    Oauth(String),

    /// The UI shell could not open the provider's consent window.
    #[error("authorization window was blocked")]
    PopupBlocked,

    /// The provider rejected the configured redirect URI.
    #[error("redirect uri mismatch")]
    RedirectUriMismatch,

    /// The provider rejected the grant (revoked or stale refresh token).
    #[error("invalid grant")]
    InvalidGrant,

    /// Access token expired and could not be refreshed.
    #[error("access token expired")]
    TokenExpired,

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Local storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot encryption/decryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] draftloom_crypto::CryptoError),

    /// The remote file for a project does not exist.
    #[error("remote file not found: {0}")]
    RemoteFileMissing(String),

    /// Catch-all for sync failures not covered above.
    #[error("sync failed: {0}")]
    SyncFailed(String),
}
