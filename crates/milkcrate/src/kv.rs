//! Key/value persistence for record collections.
//!
//! Keys are collection names ("performances", "sessions", ...), values are
//! whole serialized documents. Layout is one flat file per key:
//!
//! ```text
//! {base_path}/
//! ├── performances
//! ├── recordings
//! └── sessions
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};

/// Trait for collection storage backends.
///
/// This allows for alternative implementations (e.g., in-memory for testing,
/// browser-style local storage, remote storage).
pub trait KvStore: Send + Sync {
    /// Fetch the document stored under `key`.
    ///
    /// Returns `Ok(None)` if the key has never been written.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the document stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the document stored under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed store, one file per key.
#[derive(Debug)]
pub struct FileKvStore {
    base_path: PathBuf,
}

impl FileKvStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).context("failed to create kv directory")?;
        Ok(Self { base_path })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let value = fs::read_to_string(&path)
            .with_context(|| format!("failed to read kv file for {key}"))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // Write to a sibling temp file then rename so readers never see a
        // half-written document.
        let path = self.key_path(key);
        let tmp = self.base_path.join(format!("{key}.tmp"));
        fs::write(&tmp, value).with_context(|| format!("failed to write kv file for {key}"))?;
        fs::rename(&tmp, &path).with_context(|| format!("failed to commit kv file for {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove kv file for {key}"))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}
