//! The record library.
//!
//! Keeps every closed record in memory, newest first, and mirrors each
//! collection to the key/value store as one JSON document per record kind.
//! Audio payloads go to the blob store under the record id and are
//! re-attached lazily on export. Persistence faults never take the library
//! down; the in-memory copy keeps serving.

use std::collections::HashMap;
use std::sync::Arc;

use milkcrate::{BlobStore, KvStore};
use tracing::{debug, warn};
use waxworks::AudioBlob;

use crate::error::EngineError;
use crate::model::{CaptureRecord, RecordKind};

/// File name prefix for exported artifacts.
const EXPORT_PREFIX: &str = "encore";

/// A record flattened into files ready to hand to the user.
#[derive(Debug)]
pub struct ExportBundle {
    pub metadata_name: String,
    /// Pretty-printed record JSON, audio omitted.
    pub metadata: Vec<u8>,
    pub audio: Option<ExportAudio>,
}

/// The audio half of an export, named for its container.
#[derive(Debug)]
pub struct ExportAudio {
    pub file_name: String,
    pub blob: AudioBlob,
}

pub struct Library {
    kv: Arc<dyn KvStore>,
    blobs: BlobStore,
    collections: HashMap<RecordKind, Vec<CaptureRecord>>,
}

impl Library {
    /// Open a library over the given stores, loading whatever collections
    /// already exist. Corrupt or unreadable collections log and start empty
    /// rather than failing the open.
    pub fn open(kv: Arc<dyn KvStore>, blobs: BlobStore) -> Self {
        let mut collections = HashMap::new();
        for kind in RecordKind::ALL {
            let records = load_collection(kv.as_ref(), kind);
            debug!(kind = %kind, count = records.len(), "collection loaded");
            collections.insert(kind, records);
        }

        Self {
            kv,
            blobs,
            collections,
        }
    }

    /// Add a closed record, newest first, and mirror it to disk.
    pub fn add(&mut self, record: CaptureRecord) {
        if let Some(audio) = &record.audio {
            if let Err(e) = self.blobs.save(&record.id, &audio.data, &audio.mime_type) {
                warn!(id = %record.id, "failed to persist audio blob: {e:#}");
            }
        }

        let kind = record.kind;
        self.collections.entry(kind).or_default().insert(0, record);
        self.persist(kind);
    }

    /// Records of one kind, newest first.
    pub fn list(&self, kind: RecordKind) -> &[CaptureRecord] {
        self.collections
            .get(&kind)
            .map(|records| records.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, kind: RecordKind, id: &str) -> Option<&CaptureRecord> {
        self.list(kind).iter().find(|r| r.id == id)
    }

    /// Drop a record and its blob. Returns false if the id wasn't there.
    pub fn remove(&mut self, kind: RecordKind, id: &str) -> bool {
        let records = self.collections.entry(kind).or_default();
        let before = records.len();
        records.retain(|r| r.id != id);

        if records.len() == before {
            return false;
        }

        if let Err(e) = self.blobs.remove(id) {
            warn!(id, "failed to remove audio blob: {e:#}");
        }
        self.persist(kind);
        true
    }

    /// Flatten a record into export files.
    ///
    /// Audio falls back to the blob store when the in-memory record has
    /// already shed its payload (e.g. after a reopen).
    pub fn export(&self, kind: RecordKind, id: &str) -> Result<ExportBundle, EngineError> {
        let record = self.get(kind, id).ok_or_else(|| EngineError::NotFound {
            kind,
            id: id.to_string(),
        })?;

        let metadata =
            serde_json::to_vec_pretty(record).map_err(|source| EngineError::ExportFailed {
                id: id.to_string(),
                source,
            })?;

        let audio = self.attached_audio(record).map(|blob| ExportAudio {
            file_name: format!(
                "{EXPORT_PREFIX}_{id}.{}",
                waxworks::extension_for_mime(&blob.mime_type)
            ),
            blob,
        });

        Ok(ExportBundle {
            metadata_name: format!("{EXPORT_PREFIX}_{id}.json"),
            metadata,
            audio,
        })
    }

    fn attached_audio(&self, record: &CaptureRecord) -> Option<AudioBlob> {
        if let Some(audio) = &record.audio {
            return Some(audio.clone());
        }

        match self.blobs.load(&record.id) {
            Ok(Some(stored)) => Some(AudioBlob::new(stored.data, stored.mime_type)),
            Ok(None) => None,
            Err(e) => {
                warn!(id = %record.id, "failed to load audio blob: {e:#}");
                None
            }
        }
    }

    fn persist(&self, kind: RecordKind) {
        let records = self.list(kind);
        let json = match serde_json::to_string(records) {
            Ok(json) => json,
            Err(e) => {
                warn!(kind = %kind, "failed to serialize collection: {e}");
                return;
            }
        };

        if let Err(e) = self.kv.set(kind.storage_key(), &json) {
            warn!(kind = %kind, "failed to persist collection, serving from memory: {e:#}");
        }
    }
}

fn load_collection(kv: &dyn KvStore, kind: RecordKind) -> Vec<CaptureRecord> {
    match kv.get(kind.storage_key()) {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(records) => records,
            Err(e) => {
                warn!(kind = %kind, "corrupt collection, starting empty: {e}");
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(kind = %kind, "failed to read collection, starting empty: {e:#}");
            Vec::new()
        }
    }
}
