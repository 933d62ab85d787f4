//! Vault key material and passphrase derivation

use std::fs;
use std::path::Path;

use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use warden_core::StorageError;

use crate::encrypted_storage::write_private;

/// Size of the vault encryption key
pub const KEY_SIZE: usize = 32;

/// Size of the passphrase derivation salt
pub const SALT_SIZE: usize = 32;

/// Salt file name inside a namespace directory
const SALT_FILE: &str = "salt.json";

/// Encryption key for a vault namespace (zeroized on drop)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Derive a key from a passphrase and salt using Argon2id
    pub fn derive(passphrase: &str, salt: &[u8; SALT_SIZE]) -> Result<Self, StorageError> {
        let mut key = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StorageError::Crypto(format!("Key derivation failed: {}", e)))?;
        Ok(Self(key))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

/// Salt storage format (persisted next to the encrypted entries)
#[derive(Serialize, Deserialize)]
struct SaltFile {
    #[serde(with = "hex_salt")]
    salt: [u8; SALT_SIZE],
    /// Version for future migrations
    version: u32,
}

mod hex_salt {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::SALT_SIZE;

    pub fn serialize<S>(bytes: &[u8; SALT_SIZE], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; SALT_SIZE], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid salt length"))
    }
}

/// Load the namespace salt, creating it on first use
pub(crate) fn load_or_create_salt(dir: &Path) -> Result<[u8; SALT_SIZE], StorageError> {
    let path = dir.join(SALT_FILE);

    if path.exists() {
        let contents = fs::read_to_string(&path)?;
        let stored: SaltFile = serde_json::from_str(&contents)
            .map_err(|e| StorageError::Backend(format!("Failed to parse salt file: {}", e)))?;
        return Ok(stored.salt);
    }

    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let contents = serde_json::to_string_pretty(&SaltFile { salt, version: 1 })
        .map_err(|e| StorageError::Backend(format!("Failed to serialize salt: {}", e)))?;
    write_private(&path, contents.as_bytes())?;

    Ok(salt)
}
