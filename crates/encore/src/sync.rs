//! Best-effort remote sync.
//!
//! When a record closes, its metadata summary (never the audio) is pushed to
//! an external store keyed by user. Sync runs after the record is already
//! durable locally, never blocks the capture path, and failure is logged and
//! dropped. Subscribers can watch notices to learn remote ids.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::model::{CaptureRecord, RecordKind};

/// Metadata summary pushed to the remote store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub record_id: String,
    pub kind: RecordKind,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub duration_ms: u64,
    pub event_count: usize,
    pub track_count: usize,
    /// Present when the record carries audio; the remote only gets the
    /// container label, not the bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_mime: Option<String>,
}

impl From<&CaptureRecord> for SyncPayload {
    fn from(record: &CaptureRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            kind: record.kind,
            start_time: record.start_time,
            end_time: record.end_time,
            duration_ms: record.duration_ms,
            event_count: record.events.len(),
            track_count: record.tracks.len(),
            audio_mime: record.audio.as_ref().map(|a| a.mime_type.clone()),
        }
    }
}

/// Where a record landed remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub user_id: String,
    pub session_id: String,
    /// Set when the remote also tracked an audio row.
    pub recording_id: Option<String>,
}

/// Broadcast after a successful push.
#[derive(Debug, Clone)]
pub struct SyncNotice {
    pub record_id: String,
    pub remote: RemoteRef,
}

/// A remote store that can absorb record summaries.
///
/// `push` must be idempotent enough that re-sending the same record after a
/// partial failure is safe.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn push(&self, payload: &SyncPayload) -> anyhow::Result<RemoteRef>;
}

#[derive(Deserialize)]
struct CreatedRow {
    id: String,
}

/// REST backend: one user row, one session row per record, one recording row
/// when audio was captured.
pub struct HttpSyncBackend {
    client: reqwest::Client,
    base_url: String,
    user_name: String,
    cached_user: Mutex<Option<String>>,
}

impl HttpSyncBackend {
    pub fn new(base_url: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_name: user_name.into(),
            cached_user: Mutex::new(None),
        }
    }

    async fn ensure_user(&self) -> anyhow::Result<String> {
        if let Some(id) = self.cached_user.lock().unwrap().clone() {
            return Ok(id);
        }

        let row: CreatedRow = self
            .client
            .post(format!("{}/v1/users", self.base_url))
            .json(&serde_json::json!({ "name": self.user_name }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        *self.cached_user.lock().unwrap() = Some(row.id.clone());
        Ok(row.id)
    }
}

#[async_trait]
impl SyncBackend for HttpSyncBackend {
    async fn push(&self, payload: &SyncPayload) -> anyhow::Result<RemoteRef> {
        let user_id = self.ensure_user().await?;

        let session: CreatedRow = self
            .client
            .post(format!("{}/v1/sessions", self.base_url))
            .json(&serde_json::json!({
                "userId": user_id,
                "record": payload,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let recording_id = if let Some(mime) = &payload.audio_mime {
            let row: CreatedRow = self
                .client
                .post(format!(
                    "{}/v1/sessions/{}/recordings",
                    self.base_url, session.id
                ))
                .json(&serde_json::json!({
                    "recordId": payload.record_id,
                    "mimeType": mime,
                }))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Some(row.id)
        } else {
            None
        };

        Ok(RemoteRef {
            user_id,
            session_id: session.id,
            recording_id,
        })
    }
}

/// The sync adapter the engine talks to.
pub struct RemoteSync {
    backend: Option<Arc<dyn SyncBackend>>,
    notices: broadcast::Sender<SyncNotice>,
    refs: Mutex<HashMap<String, RemoteRef>>,
}

impl RemoteSync {
    pub fn new(backend: Arc<dyn SyncBackend>) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            backend: Some(backend),
            notices,
            refs: Mutex::new(HashMap::new()),
        }
    }

    /// An adapter that never pushes anywhere. Local capture keeps its full
    /// behavior.
    pub fn disabled() -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            backend: None,
            notices,
            refs: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Watch for successful pushes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Remote location of a record, if it has synced.
    pub fn remote_ref(&self, record_id: &str) -> Option<RemoteRef> {
        self.refs.lock().unwrap().get(record_id).cloned()
    }

    /// Push one record summary. Infallible by contract: errors are logged
    /// and the record stays local-only.
    pub async fn sync(&self, payload: SyncPayload) {
        let Some(backend) = &self.backend else {
            debug!(record = %payload.record_id, "remote sync disabled, skipping");
            return;
        };

        match backend.push(&payload).await {
            Ok(remote) => {
                info!(
                    record = %payload.record_id,
                    session = %remote.session_id,
                    "record synced"
                );
                self.refs
                    .lock()
                    .unwrap()
                    .insert(payload.record_id.clone(), remote.clone());
                let _ = self.notices.send(SyncNotice {
                    record_id: payload.record_id,
                    remote,
                });
            }
            Err(e) => {
                error!(record = %payload.record_id, "remote sync failed, record stays local: {e:#}");
            }
        }
    }
}
