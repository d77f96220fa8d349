//! Audio blob storage, one object per record id.
//!
//! Layout:
//! ```text
//! {base_path}/
//! ├── performance_1700000000000        # raw captured bytes
//! ├── performance_1700000000000.json   # {mime_type, size}
//! └── ...
//! ```
//!
//! Blobs are written once when a record closes and read back when a library
//! reopens or a record is exported.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Sidecar metadata written next to each blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub mime_type: String,
    pub size: u64,
}

/// A blob read back from disk.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).context("failed to create blob directory")?;
        Ok(Self { base_path })
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.base_path.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.base_path.join(format!("{id}.json"))
    }

    /// Store a blob and its MIME type under `id`, replacing any previous one.
    pub fn save(&self, id: &str, data: &[u8], mime_type: &str) -> Result<PathBuf> {
        let obj_path = self.object_path(id);
        fs::write(&obj_path, data).with_context(|| format!("failed to write blob for {id}"))?;

        let meta = BlobMeta {
            mime_type: mime_type.to_string(),
            size: data.len() as u64,
        };
        let json = serde_json::to_string(&meta).context("failed to serialize blob metadata")?;
        fs::write(self.meta_path(id), json)
            .with_context(|| format!("failed to write blob metadata for {id}"))?;

        Ok(obj_path)
    }

    /// Read a blob back.
    ///
    /// Returns `Ok(None)` if nothing is stored under `id`. A missing or
    /// unreadable sidecar degrades to a generic MIME type rather than failing.
    pub fn load(&self, id: &str) -> Result<Option<StoredBlob>> {
        let obj_path = self.object_path(id);
        if !obj_path.exists() {
            return Ok(None);
        }

        let data = fs::read(&obj_path).with_context(|| format!("failed to read blob for {id}"))?;

        let mime_type = fs::read_to_string(self.meta_path(id))
            .ok()
            .and_then(|json| serde_json::from_str::<BlobMeta>(&json).ok())
            .map(|meta| meta.mime_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(Some(StoredBlob { data, mime_type }))
    }

    /// Check whether a blob exists without reading it.
    pub fn exists(&self, id: &str) -> bool {
        self.object_path(id).exists()
    }

    /// Get the filesystem path for a stored blob, if present.
    pub fn path(&self, id: &str) -> Option<PathBuf> {
        let path = self.object_path(id);
        if path.exists() {
            Some(path)
        } else {
            None
        }
    }

    /// Delete a blob and its sidecar. Missing files are not an error.
    pub fn remove(&self, id: &str) -> Result<()> {
        let obj_path = self.object_path(id);
        if obj_path.exists() {
            fs::remove_file(&obj_path)
                .with_context(|| format!("failed to remove blob for {id}"))?;
        }
        let meta_path = self.meta_path(id);
        if meta_path.exists() {
            fs::remove_file(&meta_path)
                .with_context(|| format!("failed to remove blob metadata for {id}"))?;
        }
        Ok(())
    }
}
