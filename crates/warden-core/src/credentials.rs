//! Access and refresh token persistence on top of [`SecureStorage`]
//!
//! Read failures are reported through the log and surfaced as an absent
//! value; use the `try_*` accessors to get the underlying error instead.
//! Clearing is best-effort and never fails outwardly.

use std::fmt;
use std::sync::Arc;

use tracing::warn;
use zeroize::Zeroizing;

use crate::error::StorageError;
use crate::storage::SecureStorage;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "warden.access_token";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "warden.refresh_token";

/// Token storage scoped to one secure storage backend
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl CredentialStore {
    /// Create a credential store backed by the given storage
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// The underlying storage backend
    pub fn storage(&self) -> &Arc<dyn SecureStorage> {
        &self.storage
    }

    /// Persist the access token
    pub fn save_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.save_string(token, ACCESS_TOKEN_KEY)
    }

    /// Persist the refresh token
    pub fn save_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.save_string(token, REFRESH_TOKEN_KEY)
    }

    /// The stored access token, or `None` if absent or unreadable
    pub fn access_token(&self) -> Option<Zeroizing<String>> {
        self.read_reported(ACCESS_TOKEN_KEY)
    }

    /// The stored refresh token, or `None` if absent or unreadable
    pub fn refresh_token(&self) -> Option<Zeroizing<String>> {
        self.read_reported(REFRESH_TOKEN_KEY)
    }

    /// The stored access token, surfacing storage errors
    pub fn try_access_token(&self) -> Result<Option<Zeroizing<String>>, StorageError> {
        self.read(ACCESS_TOKEN_KEY)
    }

    /// The stored refresh token, surfacing storage errors
    pub fn try_refresh_token(&self) -> Result<Option<Zeroizing<String>>, StorageError> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Remove both tokens
    ///
    /// Returns `false` if any delete failed. Failures are logged, not
    /// propagated: abandoning a token is acceptable, failing a logout is not.
    pub fn clear_tokens(&self) -> bool {
        let mut cleared = true;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.storage.delete(key) {
                warn!(
                    namespace = self.storage.namespace(),
                    "Failed to clear {}: {}", key, e
                );
                cleared = false;
            }
        }
        cleared
    }

    fn read(&self, key: &str) -> Result<Option<Zeroizing<String>>, StorageError> {
        Ok(self.storage.read_string(key)?.map(Zeroizing::new))
    }

    fn read_reported(&self, key: &str) -> Option<Zeroizing<String>> {
        match self.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    namespace = self.storage.namespace(),
                    "Failed to read {}: {}", key, e
                );
                None
            }
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("namespace", &self.storage.namespace())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn store() -> (CredentialStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new("com.warden.tests.credentials"));
        (CredentialStore::new(storage.clone()), storage)
    }

    #[test]
    fn test_save_and_read_tokens() {
        let (credentials, _) = store();
        credentials.save_access_token("access123").unwrap();
        credentials.save_refresh_token("refresh456").unwrap();

        assert_eq!(credentials.access_token().as_deref().map(String::as_str), Some("access123"));
        assert_eq!(credentials.refresh_token().as_deref().map(String::as_str), Some("refresh456"));
    }

    #[test]
    fn test_missing_tokens_are_none() {
        let (credentials, _) = store();
        assert!(credentials.access_token().is_none());
        assert!(credentials.refresh_token().is_none());
    }

    #[test]
    fn test_overwrite_access_token() {
        let (credentials, _) = store();
        credentials.save_access_token("old").unwrap();
        credentials.save_access_token("new").unwrap();
        assert_eq!(credentials.access_token().as_deref().map(String::as_str), Some("new"));
    }

    #[test]
    fn test_clear_tokens_removes_both() {
        let (credentials, storage) = store();
        credentials.save_access_token("access").unwrap();
        credentials.save_refresh_token("refresh").unwrap();

        assert!(credentials.clear_tokens());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_clear_tokens_when_empty() {
        let (credentials, _) = store();
        assert!(credentials.clear_tokens());
    }

    #[test]
    fn test_read_failure_is_reported_as_absent() {
        let (credentials, storage) = store();
        credentials.save_access_token("access").unwrap();

        storage.set_failing(true);
        assert!(credentials.access_token().is_none());
        assert!(credentials.try_access_token().is_err());
    }

    #[test]
    fn test_clear_failure_is_swallowed() {
        let (credentials, storage) = store();
        credentials.save_access_token("access").unwrap();

        storage.set_failing(true);
        assert!(!credentials.clear_tokens());

        storage.set_failing(false);
        assert!(storage.contains(ACCESS_TOKEN_KEY));
    }
}
