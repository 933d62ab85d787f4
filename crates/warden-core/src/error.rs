//! Error types for the Warden core library

use thiserror::Error;

/// Errors reported by a secure storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored value is not valid UTF-8")]
    Encoding,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Decryption failed - wrong key or corrupted data")]
    DecryptionFailed,
}

/// Errors reported by an authenticator challenge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    Failed(String),

    #[error("Authentication cancelled by user")]
    Cancelled,

    #[error("No authentication method available")]
    Unavailable,

    #[error("Platform authenticator error: {0}")]
    Platform(String),
}
