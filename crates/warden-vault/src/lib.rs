//! Warden Vault - Encrypted file-backed secure storage
//!
//! Implements [`warden_core::SecureStorage`] on the local filesystem.
//!
//! # Security Model
//!
//! - Each value is encrypted with ChaCha20-Poly1305 under a 32-byte key
//! - The key is supplied directly or derived from a passphrase via Argon2id
//! - Ciphertexts are bound to their namespace and key name (AEAD associated data)
//! - File names are SHA-256 digests of the key, so key names never hit the disk
//! - Key material is zeroized on drop

mod encrypted_storage;
mod key;

pub use encrypted_storage::EncryptedFileStorage;
pub use key::{VaultKey, KEY_SIZE, SALT_SIZE};
