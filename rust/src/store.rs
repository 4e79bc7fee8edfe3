//! The root of a configuration tree together with its persistence protocol.
//!
//! `load` reads plaintext TOML or JSON, `save` seals the encoded tree with the
//! key stored next to it, and `restore` reverses `save`. The key file is the
//! only thing that can open the save file; if it is missing there is nothing
//! to restore and `restore` quietly does nothing.

use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::crypto::integrity::sha256_hex;
use crate::crypto::secrets::{SecretVault, SecretVaultError};
use crate::format::SourceFormat;
use crate::node::Node;
use crate::paths::{normalize_path, resolve_paths, PathNormalizer};
use crate::transcode::{self, Mapping};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config source is missing or not a regular file: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("a store cannot load a source and restore in the same construction")]
    InvalidConstruction,
    #[error("persisted config could not be decrypted: {0}")]
    DecryptionFailure(String),
    #[error("failed to parse '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("i/o error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("key error: {0}")]
    Vault(SecretVaultError),
}

impl From<SecretVaultError> for StoreError {
    fn from(err: SecretVaultError) -> Self {
        match err {
            SecretVaultError::DecryptionFailed(message) => StoreError::DecryptionFailure(message),
            other => StoreError::Vault(other),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Root Node plus the files it is persisted to.
///
/// Derefs to its root [`Node`], so attribute reads, `update`, `add_child` and
/// dotted lookups work on the store directly.
#[derive(Debug)]
pub struct Store {
    root: Node,
    save_path: String,
    key_path: String,
    raw: Mapping,
}

impl Deref for Store {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.root
    }
}

impl DerefMut for Store {
    fn deref_mut(&mut self) -> &mut Node {
        &mut self.root
    }
}

impl Store {
    /// Empty store persisting to the locations in `config`.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            root: Node::new(transcode::ROOT_NAME),
            save_path: normalize_location(&config.save_path),
            key_path: normalize_location(&config.key_path),
            raw: Mapping::new(),
        }
    }

    /// Builds a store and immediately loads `load_path` or restores the
    /// persisted copy. Asking for both is a usage error.
    pub fn open(
        config: StoreConfig,
        load_path: Option<&Path>,
        restore: bool,
    ) -> Result<Self, StoreError> {
        if load_path.is_some() && restore {
            return Err(StoreError::InvalidConstruction);
        }

        let mut store = Self::new(config);
        if let Some(source) = load_path {
            store.load(source)?;
        }
        if restore {
            store.restore()?;
        }
        Ok(store)
    }

    /// Forward-slash form of the save target.
    pub fn save_path(&self) -> &str {
        &self.save_path
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    pub fn set_save_path(&mut self, path: impl AsRef<Path>) {
        self.save_path = normalize_location(path.as_ref());
    }

    pub fn set_key_path(&mut self, path: impl AsRef<Path>) {
        self.key_path = normalize_location(path.as_ref());
    }

    /// Raw mapping behind the last load or restore, after path resolution.
    pub fn raw(&self) -> &Mapping {
        &self.raw
    }

    /// Reads a TOML or JSON file and merges its contents into the store,
    /// overwriting attributes that already exist.
    pub fn load(&mut self, source: impl AsRef<Path>) -> Result<(), StoreError> {
        let source = source.as_ref();
        create_parent_dir(Path::new(&self.save_path))?;

        if !source.is_file() {
            return Err(StoreError::NotFound(source.to_path_buf()));
        }
        let format = SourceFormat::from_path(source)
            .ok_or_else(|| StoreError::UnsupportedFormat(source.to_path_buf()))?;

        let text = fs::read_to_string(source).map_err(io_error(source))?;
        let raw = format.parse(&text).map_err(|e| StoreError::Parse {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(source = %source.display(), %format, entries = raw.len(), "loaded config source");
        self.absorb(resolve_paths(&raw));
        Ok(())
    }

    /// Seals the encoded tree into the save target, creating the key file on
    /// first use. The write is a plain overwrite, not an atomic replace.
    pub fn save(&self) -> Result<(), StoreError> {
        let plaintext = serde_json::to_vec(&self.to_json())?;
        let save_path = Path::new(&self.save_path);
        let key_path = Path::new(&self.key_path);

        create_parent_dir(save_path)?;
        create_parent_dir(key_path)?;

        let vault = SecretVault::load_or_generate(key_path)?;
        let sealed = vault.encrypt(&plaintext)?;
        fs::write(save_path, &sealed).map_err(io_error(save_path))?;

        info!(save_path = %self.save_path, bytes = sealed.len(), "saved encrypted config");
        Ok(())
    }

    /// Like [`Store::save`], but first switches to the given locations. The
    /// new locations stay in effect for later calls.
    pub fn save_as(
        &mut self,
        save_path: Option<&Path>,
        key_path: Option<&Path>,
    ) -> Result<(), StoreError> {
        if let Some(path) = save_path {
            self.set_save_path(path);
        }
        if let Some(path) = key_path {
            self.set_key_path(path);
        }
        self.save()
    }

    /// Decrypts the save target and merges it into the store exactly as
    /// `load` does. Without a key file this is a no-op.
    pub fn restore(&mut self) -> Result<(), StoreError> {
        let key_path = PathBuf::from(&self.key_path);
        if !key_path.is_file() {
            debug!(key_path = %self.key_path, "no key file, nothing to restore");
            return Ok(());
        }

        let save_path = PathBuf::from(&self.save_path);
        let vault = SecretVault::from_key_file(&key_path)?;
        let sealed = fs::read(&save_path).map_err(io_error(&save_path))?;
        let plaintext = vault.decrypt(&sealed)?;

        let raw: Mapping = serde_json::from_slice(&plaintext).map_err(|e| StoreError::Parse {
            path: save_path.clone(),
            message: e.to_string(),
        })?;

        debug!(save_path = %self.save_path, entries = raw.len(), "restored encrypted config");
        self.absorb(resolve_paths(&raw));
        Ok(())
    }

    /// Deletes the save target and key file and empties the store. Files that
    /// are already gone are not an error, so pruning twice is fine.
    pub fn prune(&mut self) -> Result<(), StoreError> {
        remove_if_present(Path::new(&self.save_path))?;
        remove_if_present(Path::new(&self.key_path))?;
        self.raw.clear();
        self.root.clear();
        Ok(())
    }

    /// Encoded form of the whole tree, without private attributes.
    pub fn to_json(&self) -> Mapping {
        transcode::encode(&self.root)
    }

    pub fn to_json_pretty(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// SHA-256 of the canonical encoded JSON. Equal trees give equal
    /// fingerprints.
    pub fn fingerprint(&self) -> Result<String, StoreError> {
        Ok(sha256_hex(&serde_json::to_vec(&self.to_json())?))
    }

    fn absorb(&mut self, raw: Mapping) {
        let decoded = transcode::decode_with(&raw, &PathNormalizer);
        self.root.merge(decoded);
        self.raw = raw;
    }
}

fn normalize_location(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

fn create_parent_dir(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))
        }
        _ => Ok(()),
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed persisted file");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error(path)(err)),
    }
}
