//! On-disk locations used by a `Store`. The library never reads ambient
//! state on its own: callers build a `StoreConfig` explicitly, optionally
//! rooted at the per-user default directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory under the user's home that holds the persisted files.
pub const DATA_DIR_NAME: &str = ".configurator";
pub const DEFAULT_SAVE_FILE: &str = "config";
pub const DEFAULT_KEY_FILE: &str = "secret.key";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("home directory not found")]
    NoHomeDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Encrypted save target.
    pub save_path: PathBuf,
    /// File holding the encryption key, created on first save.
    pub key_path: PathBuf,
}

impl StoreConfig {
    pub fn new(save_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(DEFAULT_SAVE_FILE), dir.join(DEFAULT_KEY_FILE))
    }

    /// `~/.configurator`
    pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(DATA_DIR_NAME))
    }

    pub fn per_user() -> Result<Self, ConfigError> {
        Ok(Self::in_dir(Self::default_data_dir()?))
    }
}
