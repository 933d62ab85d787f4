//! Secure key-value storage interface
//!
//! Backends are scoped to a namespace so different subsystems can store
//! values without key collisions. Deleting a key that does not exist is
//! not an error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use zeroize::Zeroize;

use crate::error::StorageError;

/// Namespaced secure key-value storage
pub trait SecureStorage: Send + Sync {
    /// The namespace this storage is scoped to
    fn namespace(&self) -> &str;

    /// Save bytes under `key`, overwriting any existing value
    fn save(&self, data: &[u8], key: &str) -> Result<(), StorageError>;

    /// Read the bytes stored under `key`
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete the value stored under `key`
    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every value in this namespace
    fn delete_all(&self) -> Result<(), StorageError>;

    /// Save a UTF-8 string under `key`
    fn save_string(&self, value: &str, key: &str) -> Result<(), StorageError> {
        self.save(value.as_bytes(), key)
    }

    /// Read a UTF-8 string stored under `key`
    fn read_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.read(key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| StorageError::Encoding),
            None => Ok(None),
        }
    }
}

/// In-process storage backend
///
/// Values live only as long as the instance and are zeroized when removed.
/// Failures can be injected with [`set_failing`](Self::set_failing) to
/// exercise error paths.
#[derive(Debug)]
pub struct MemoryStorage {
    namespace: String,
    entries: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty storage for the given namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Check whether a value is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether the storage holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "storage '{}' unavailable",
                self.namespace
            )));
        }

        self.entries
            .lock()
            .map_err(|_| StorageError::Backend("storage lock poisoned".to_string()))
    }
}

impl SecureStorage for MemoryStorage {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn save(&self, data: &[u8], key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries()?;
        if let Some(mut previous) = entries.insert(key.to_string(), data.to_vec()) {
            previous.zeroize();
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        if let Some(mut value) = self.entries()?.remove(key) {
            value.zeroize();
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        let mut entries = self.entries()?;
        for (_, mut value) in entries.drain() {
            value.zeroize();
        }
        Ok(())
    }
}
