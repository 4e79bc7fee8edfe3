//! Authenticated vault built on ChaCha20-Poly1305.
//! Sealed data is laid out as nonce + ciphertext + auth tag in one opaque blob,
//! and the key lives in its own file as base64 text so the persisted config is
//! useless without it.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum SecretVaultError {
    #[error("invalid key length; expected 32 bytes")]
    InvalidKeyLength,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("key source unreadable: {0}")]
    KeySourceUnreadable(String),
    #[error("base64 decoding failed: {0}")]
    Base64DecodeFailed(String),
    #[error("key could not be persisted: {0}")]
    KeyPersistFailed(String),
}

/// Holds the symmetric key used to seal the persisted configuration.
pub struct SecretVault {
    key: Key,
}

impl SecretVault {
    /// Fresh random key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            key: ChaCha20Poly1305::generate_key(&mut OsRng),
        }
    }

    /// Builds a vault from raw key bytes. The key must be 32 bytes for ChaCha20-Poly1305.
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, SecretVaultError> {
        if key_bytes.len() != KEY_LEN {
            return Err(SecretVaultError::InvalidKeyLength);
        }
        let mut key = Key::default();
        key.copy_from_slice(key_bytes);
        Ok(Self { key })
    }

    /// Reads a base64-encoded key from disk.
    pub fn from_key_file(path: &Path) -> Result<Self, SecretVaultError> {
        let mut content = fs::read_to_string(path)
            .map_err(|e| SecretVaultError::KeySourceUnreadable(format!("{e}")))?;
        let decoded = STANDARD_NO_PAD
            .decode(content.trim().as_bytes())
            .map_err(|e| SecretVaultError::Base64DecodeFailed(format!("{e}")));
        content.zeroize();
        let mut decoded = decoded?;
        let vault = Self::from_key_bytes(&decoded);
        decoded.zeroize();
        vault
    }

    /// Loads the key at `path`, or generates one and persists it there when
    /// the file does not exist yet.
    pub fn load_or_generate(path: &Path) -> Result<Self, SecretVaultError> {
        if path.is_file() {
            return Self::from_key_file(path);
        }
        let vault = Self::generate();
        vault.persist(path)?;
        Ok(vault)
    }

    /// Writes the key as base64 text. On Unix the file is readable by its
    /// owner only.
    pub fn persist(&self, path: &Path) -> Result<(), SecretVaultError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SecretVaultError::KeyPersistFailed(format!("{e}")))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| SecretVaultError::KeyPersistFailed(format!("{e}")))?;

        #[cfg(unix)]
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| SecretVaultError::KeyPersistFailed(format!("{e}")))?;

        let mut encoded = STANDARD_NO_PAD.encode(self.key.as_slice());
        let written = file.write_all(encoded.as_bytes());
        encoded.zeroize();
        written.map_err(|e| SecretVaultError::KeyPersistFailed(format!("{e}")))
    }

    /// Seals `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, SecretVaultError> {
        let cipher = ChaCha20Poly1305::new(&self.key);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

        let ciphertext_and_tag = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SecretVaultError::EncryptionFailed(format!("{e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext_and_tag.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext_and_tag);
        Ok(sealed)
    }

    /// Opens data produced by [`SecretVault::encrypt`]. Fails on a wrong key
    /// or any modified byte.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, SecretVaultError> {
        if sealed.len() < NONCE_LEN + TAG_SIZE {
            return Err(SecretVaultError::DecryptionFailed(
                "ciphertext shorter than nonce and authentication tag".to_string(),
            ));
        }
        let (nonce, ciphertext_and_tag) = sealed.split_at(NONCE_LEN);

        let cipher = ChaCha20Poly1305::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext_and_tag)
            .map_err(|e| SecretVaultError::DecryptionFailed(format!("{e}")))
    }
}

impl fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretVault")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Drop for SecretVault {
    fn drop(&mut self) {
        // Zero the key material on drop to reduce its lifetime in memory.
        self.key.as_mut_slice().zeroize();
    }
}
