//! Warden Core - Credential expiry, secure storage and authenticator seams
//!
//! This crate provides the leaf types shared by the Warden session
//! lifecycle coordinator:
//! - Credential expiry tracking with a proactive refresh window
//! - The secure key-value storage interface and an in-memory backend
//! - Access/refresh token persistence on top of any storage backend
//! - The authenticator capability used to re-authenticate after locking

pub mod auth;
pub mod credentials;
pub mod error;
pub mod expiry;
pub mod storage;

pub use auth::{AuthMethod, Authenticator, StaticAuthenticator};
pub use credentials::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use error::{AuthError, StorageError};
pub use expiry::{ExpiryStatus, ExpiryTracker};
pub use storage::{MemoryStorage, SecureStorage};

/// Default refresh buffer before credential expiry, in seconds
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 60;

/// Default inactivity timeout, in seconds (5 minutes)
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Default delay between entering the background and locking, in seconds
pub const DEFAULT_LOCK_DELAY_SECS: u64 = 0;

/// Reason shown by the authenticator when unlocking on foreground
pub const DEFAULT_UNLOCK_REASON: &str = "Unlock to continue";

/// Default storage namespace for session credentials
pub const DEFAULT_STORAGE_NAMESPACE: &str = "com.warden.session";
