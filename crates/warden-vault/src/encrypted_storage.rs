//! Encrypted file storage
//!
//! # Storage Format
//!
//! Each key is stored in its own file
//! `<base>/<sha256(namespace)>/<sha256(key)>.enc`:
//! - 12-byte nonce
//! - ChaCha20-Poly1305 ciphertext of the value
//! - 16-byte authentication tag (appended by ChaCha20-Poly1305)
//!
//! The associated data is `namespace || 0x00 || key`, so a file copied to
//! another key name or namespace fails to decrypt.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use warden_core::{SecureStorage, StorageError};

use crate::key::{load_or_create_salt, VaultKey};

/// Size of the nonce for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Extension for encrypted entries
const ENTRY_EXTENSION: &str = "enc";

/// File-backed [`SecureStorage`] encrypting every value at rest
#[derive(Debug)]
pub struct EncryptedFileStorage {
    /// Namespace this storage is scoped to
    namespace: String,
    /// Directory holding the namespace's entries
    dir: PathBuf,
    /// Encryption key
    key: VaultKey,
}

impl EncryptedFileStorage {
    /// Open (or create) a namespace under `base_path` with an explicit key
    pub fn open(
        base_path: impl AsRef<Path>,
        namespace: impl Into<String>,
        key: VaultKey,
    ) -> Result<Self, StorageError> {
        let namespace = namespace.into();
        let dir = base_path.as_ref().join(directory_name(&namespace));
        fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }

        debug!("Opened encrypted storage at {:?}", dir);
        Ok(Self { namespace, dir, key })
    }

    /// Open (or create) a namespace with a key derived from `passphrase`
    ///
    /// The derivation salt is generated on first use and kept in the
    /// namespace directory.
    pub fn open_with_passphrase(
        base_path: impl AsRef<Path>,
        namespace: impl Into<String>,
        passphrase: &str,
    ) -> Result<Self, StorageError> {
        let namespace = namespace.into();
        let dir = base_path.as_ref().join(directory_name(&namespace));
        fs::create_dir_all(&dir)?;

        let salt = load_or_create_salt(&dir)?;
        let key = VaultKey::derive(passphrase, &salt)?;
        Self::open(base_path, namespace, key)
    }

    /// Get the default base path
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warden")
            .join("vault")
    }

    /// Directory holding this namespace's entries
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    fn associated_data(&self, key: &str) -> Vec<u8> {
        let mut aad = Vec::with_capacity(self.namespace.len() + 1 + key.len());
        aad.extend_from_slice(self.namespace.as_bytes());
        aad.push(0);
        aad.extend_from_slice(key.as_bytes());
        aad
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, StorageError> {
        ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
            .map_err(|e| StorageError::Crypto(format!("Invalid key: {}", e)))
    }
}

impl SecureStorage for EncryptedFileStorage {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn save(&self, data: &[u8], key: &str) -> Result<(), StorageError> {
        // Generate random nonce
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let aad = self.associated_data(key);
        let ciphertext = self
            .cipher()?
            .encrypt(nonce, Payload { msg: data, aad: &aad })
            .map_err(|e| StorageError::Crypto(format!("Encryption failed: {}", e)))?;

        // Combine nonce + ciphertext
        let mut encrypted = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        encrypted.extend_from_slice(&nonce_bytes);
        encrypted.extend_from_slice(&ciphertext);

        write_private(&self.entry_path(key), &encrypted)?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let encrypted = match fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if encrypted.len() < NONCE_SIZE {
            return Err(StorageError::Backend("Encrypted entry too short".to_string()));
        }

        let (nonce, ciphertext) = encrypted.split_at(NONCE_SIZE);
        let aad = self.associated_data(key);
        let plaintext = self
            .cipher()?
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| StorageError::DecryptionFailed)?;

        Ok(Some(plaintext))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_all(&self) -> Result<(), StorageError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_entry = path
                .extension()
                .map(|ext| ext == ENTRY_EXTENSION || ext == "tmp")
                .unwrap_or(false);

            if is_entry {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }
}

/// Write a file readable only by the owner, atomically via a temp file
pub(crate) fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&temp_path, path)
}

/// Map a namespace to its directory name
///
/// Hashing keeps distinct namespaces in distinct directories whatever
/// characters they contain.
fn directory_name(namespace: &str) -> String {
    hex::encode(Sha256::digest(namespace.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_key() -> VaultKey {
        VaultKey::from_bytes([42u8; 32])
    }

    #[test]
    fn test_save_and_read() {
        let temp_dir = tempdir().unwrap();
        let storage = EncryptedFileStorage::open(temp_dir.path(), "com.warden.tests", test_key())
            .unwrap();

        storage.save_string("access123", "access").unwrap();
        assert_eq!(
            storage.read_string("access").unwrap().as_deref(),
            Some("access123")
        );
        assert_eq!(storage.read("missing").unwrap(), None);
    }

    #[test]
    fn test_plaintext_not_on_disk() {
        let temp_dir = tempdir().unwrap();
        let storage = EncryptedFileStorage::open(temp_dir.path(), "com.warden.tests", test_key())
            .unwrap();

        storage.save_string("super-secret-token", "access").unwrap();

        let raw = fs::read(storage.entry_path("access")).unwrap();
        let needle = b"super-secret-token";
        assert!(!raw.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn test_wrong_key_fails() {
        let temp_dir = tempdir().unwrap();
        let storage = EncryptedFileStorage::open(temp_dir.path(), "com.warden.tests", test_key())
            .unwrap();
        storage.save(b"value", "key").unwrap();

        let other =
            EncryptedFileStorage::open(temp_dir.path(), "com.warden.tests", VaultKey::from_bytes([99u8; 32]))
                .unwrap();
        assert!(matches!(other.read("key"), Err(StorageError::DecryptionFailed)));
    }

    #[test]
    fn test_swapped_entry_fails() {
        let temp_dir = tempdir().unwrap();
        let storage = EncryptedFileStorage::open(temp_dir.path(), "com.warden.tests", test_key())
            .unwrap();
        storage.save(b"value", "first").unwrap();

        fs::copy(storage.entry_path("first"), storage.entry_path("second")).unwrap();
        assert!(matches!(storage.read("second"), Err(StorageError::DecryptionFailed)));
    }

    #[test]
    fn test_delete_and_delete_all() {
        let temp_dir = tempdir().unwrap();
        let storage =
            EncryptedFileStorage::open_with_passphrase(temp_dir.path(), "com.warden.tests", "hunter22")
                .unwrap();

        storage.save(b"a", "one").unwrap();
        storage.save(b"b", "two").unwrap();

        storage.delete("one").unwrap();
        storage.delete("one").unwrap();
        assert_eq!(storage.read("one").unwrap(), None);

        storage.delete_all().unwrap();
        assert_eq!(storage.read("two").unwrap(), None);

        // Salt survives so the passphrase keeps working
        assert!(storage.directory().join("salt.json").exists());
    }

    #[test]
    fn test_passphrase_reopen() {
        let temp_dir = tempdir().unwrap();
        {
            let storage = EncryptedFileStorage::open_with_passphrase(
                temp_dir.path(),
                "com.warden.tests",
                "hunter22",
            )
            .unwrap();
            storage.save(b"persisted", "key").unwrap();
        }

        let reopened =
            EncryptedFileStorage::open_with_passphrase(temp_dir.path(), "com.warden.tests", "hunter22")
                .unwrap();
        assert_eq!(reopened.read("key").unwrap(), Some(b"persisted".to_vec()));

        let wrong =
            EncryptedFileStorage::open_with_passphrase(temp_dir.path(), "com.warden.tests", "letmein")
                .unwrap();
        assert!(matches!(wrong.read("key"), Err(StorageError::DecryptionFailed)));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let temp_dir = tempdir().unwrap();
        let a = EncryptedFileStorage::open(temp_dir.path(), "ns.a", test_key()).unwrap();
        let b = EncryptedFileStorage::open(temp_dir.path(), "ns.b", test_key()).unwrap();

        a.save(b"value", "key").unwrap();
        assert_eq!(b.read("key").unwrap(), None);
        assert_ne!(a.directory(), b.directory());
    }

    #[cfg(unix)]
    #[test]
    fn test_entries_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let storage = EncryptedFileStorage::open(temp_dir.path(), "com.warden.tests", test_key())
            .unwrap();
        storage.save(b"value", "key").unwrap();

        let mode = fs::metadata(storage.entry_path("key")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let leftovers = fs::read_dir(storage.directory())
            .unwrap()
            .filter(|entry| {
                entry.as_ref().unwrap().path().extension().map_or(false, |ext| ext == "tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_default_path_uses_platform_data_dir() {
        let path = EncryptedFileStorage::default_path();
        assert!(path.ends_with(Path::new("warden").join("vault")));
        if let Some(data_dir) = dirs::data_local_dir() {
            assert!(path.starts_with(data_dir));
        }
    }

    #[test]
    fn test_similar_namespaces_are_isolated() {
        let temp_dir = tempdir().unwrap();
        let slashed = EncryptedFileStorage::open(temp_dir.path(), "bank/a", test_key()).unwrap();
        let underscored = EncryptedFileStorage::open(temp_dir.path(), "bank_a", test_key()).unwrap();
        assert_ne!(slashed.directory(), underscored.directory());

        slashed.save_string("secret-a", "token").unwrap();
        assert_eq!(underscored.read("token").unwrap(), None);

        underscored.save_string("secret-b", "token").unwrap();
        underscored.delete_all().unwrap();
        assert_eq!(
            slashed.read_string("token").unwrap().as_deref(),
            Some("secret-a")
        );
    }

    #[test]
    fn test_directory_name_stays_inside_base() {
        for namespace in ["", ".", "..", "../etc", "a/b", "com.warden.session"] {
            let name = directory_name(namespace);
            assert_eq!(name.len(), 64);
            assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        }
        assert_ne!(directory_name("a/b"), directory_name("a_b"));
    }
}
