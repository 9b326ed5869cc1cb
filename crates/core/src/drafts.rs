//! Keyed local persistence for unsent client state.
//!
//! Workflows receive a [`KeyedStore`] instead of reaching for a global. [`MemoryStore`] is
//! used in tests and short-lived sessions; [`FileStore`] keeps one file per key so drafts
//! survive a restart.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("invalid draft key: {0}")]
    InvalidKey(String),
    #[error("draft storage error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode draft: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("draft store lock poisoned")]
    LockPoisoned,
}

pub type DraftResult<T> = std::result::Result<T, DraftError>;

pub trait KeyedStore {
    fn load(&self, key: &str) -> DraftResult<Option<String>>;
    fn save(&self, key: &str, value: &str) -> DraftResult<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> DraftResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyedStore for MemoryStore {
    fn load(&self, key: &str) -> DraftResult<Option<String>> {
        let values = self.values.lock().map_err(|_| DraftError::LockPoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> DraftResult<()> {
        let mut values = self.values.lock().map_err(|_| DraftError::LockPoisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> DraftResult<()> {
        let mut values = self.values.lock().map_err(|_| DraftError::LockPoisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates the store, making `dir` if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> DraftResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> DraftResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DraftError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyedStore for FileStore {
    fn load(&self, key: &str) -> DraftResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> DraftResult<()> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written draft.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> DraftResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
