//! The capture engine.
//!
//! Single owner of the recording state machine. All methods take `&mut self`
//! so callers drive the engine from one task; the state check in
//! `start_performance_capture` runs before any await point, which is what
//! keeps double starts out even under interleaved async callers.
//!
//! ```text
//! Idle -> Recording -> Stopping -> Finalizing -> Idle
//! ```
//!
//! Stopping covers the encoder flush, Finalizing covers normalization,
//! sealing and persistence. "Closed" is a property of the record that falls
//! out at the end, not a state the engine dwells in.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use waxworks::AudioBlob;

use crate::capture::{ActiveCapture, CapturePipeline};
use crate::correlator::{CapturedEvents, EventCorrelator};
use crate::error::EngineError;
use crate::graph::AudioGraphProvider;
use crate::library::{ExportBundle, Library};
use crate::model::{CaptureRecord, EventKind, RecordKind};
use crate::sync::{RemoteSync, SyncPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopping,
    Finalizing,
}

struct ActivePerformance {
    id: String,
    start_time: u64,
    capture: ActiveCapture,
}

pub struct CaptureEngine {
    graphs: Arc<dyn AudioGraphProvider>,
    library: Library,
    sync: Arc<RemoteSync>,
    correlator: EventCorrelator,
    pipeline: CapturePipeline,
    state: CaptureState,
    active: Option<ActivePerformance>,
}

impl CaptureEngine {
    pub fn new(
        graphs: Arc<dyn AudioGraphProvider>,
        library: Library,
        sync: Arc<RemoteSync>,
    ) -> Self {
        Self {
            graphs,
            library,
            sync,
            correlator: EventCorrelator::new(),
            pipeline: CapturePipeline::new(),
            state: CaptureState::Idle,
            active: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn remote_sync(&self) -> &RemoteSync {
        &self.sync
    }

    /// Begin a performance capture.
    ///
    /// Fails without touching engine state, so a rejected start leaves any
    /// running capture untouched and a failed tap leaves the engine Idle.
    pub fn start_performance_capture(&mut self) -> Result<String, EngineError> {
        if self.state != CaptureState::Idle {
            return Err(EngineError::AlreadyRecording);
        }

        let graph = self
            .graphs
            .active_graph()
            .ok_or(EngineError::MissingAudioContext)?;

        let capture = self.pipeline.start(graph.as_ref())?;

        let start_time = epoch_ms();
        let id = RecordKind::Performance.generate_id(start_time);
        self.correlator.begin_capture();

        info!(id = %id, mime = %capture.mime_type(), "performance capture started");

        self.active = Some(ActivePerformance {
            id: id.clone(),
            start_time,
            capture,
        });
        self.state = CaptureState::Recording;

        Ok(id)
    }

    /// Forward one desk action into the event log.
    ///
    /// Safe to call unconditionally; outside a capture window this is a
    /// no-op.
    pub fn record_event(&mut self, kind: EventKind, track_id: &str, payload: Value) {
        self.correlator.record_event(kind, track_id, payload);
    }

    /// Stop the running capture and seal its record.
    ///
    /// Returns `None` when nothing was recording. Normalization and
    /// persistence failures degrade (raw audio kept, memory-only record)
    /// rather than failing the stop.
    pub async fn stop_performance_capture(&mut self) -> Option<CaptureRecord> {
        if self.state != CaptureState::Recording {
            debug!("stop requested while not recording, ignoring");
            return None;
        }
        let Some(active) = self.active.take() else {
            warn!("recording state without active capture, resetting");
            self.state = CaptureState::Idle;
            return None;
        };

        self.state = CaptureState::Stopping;
        let raw = self.pipeline.stop(active.capture).await;

        self.state = CaptureState::Finalizing;
        let CapturedEvents { events, tracks } = self.correlator.end_capture();
        let end_time = epoch_ms();

        let audio = match raw {
            Some(blob) => Some(normalize_off_thread(blob).await),
            None => None,
        };

        let record = CaptureRecord::performance(
            active.id,
            active.start_time,
            end_time,
            events,
            tracks,
            audio,
        );

        info!(
            id = %record.id,
            duration_ms = record.duration_ms,
            events = record.events.len(),
            tracks = record.tracks.len(),
            audio = record.has_audio(),
            "performance capture closed"
        );

        self.library.add(record.clone());
        self.spawn_sync(&record);
        self.state = CaptureState::Idle;

        Some(record)
    }

    /// Capture the mixer's current state as a snapshot record.
    ///
    /// Works regardless of recording state and never touches the audio
    /// pipeline. Remote sync rides the ambient tokio runtime; called
    /// without one, the record stays local-only.
    pub fn save_current_state(&mut self, state: Value) -> CaptureRecord {
        let now = epoch_ms();
        let id = RecordKind::StateSnapshot.generate_id(now);
        let record = CaptureRecord::snapshot(id, now, state);

        info!(id = %record.id, tracks = record.tracks.len(), "state snapshot saved");

        self.library.add(record.clone());
        self.spawn_sync(&record);
        record
    }

    /// Records of one kind, newest first.
    pub fn list(&self, kind: RecordKind) -> &[CaptureRecord] {
        self.library.list(kind)
    }

    pub fn get(&self, kind: RecordKind, id: &str) -> Option<&CaptureRecord> {
        self.library.get(kind, id)
    }

    /// Delete a record and its audio.
    pub fn remove(&mut self, kind: RecordKind, id: &str) -> Result<(), EngineError> {
        if self.library.remove(kind, id) {
            info!(id, %kind, "record removed");
            Ok(())
        } else {
            Err(EngineError::NotFound {
                kind,
                id: id.to_string(),
            })
        }
    }

    /// Flatten a record into export files.
    pub fn export(&self, kind: RecordKind, id: &str) -> Result<ExportBundle, EngineError> {
        self.library.export(kind, id)
    }

    fn spawn_sync(&self, record: &CaptureRecord) {
        let sync = Arc::clone(&self.sync);
        let payload = SyncPayload::from(record);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                sync.sync(payload).await;
            });
        } else {
            debug!(record = %payload.record_id, "no async runtime, skipping remote sync");
        }
    }
}

/// Decode and re-encode off the async runtime's worker threads.
async fn normalize_off_thread(blob: AudioBlob) -> AudioBlob {
    let fallback = blob.clone();
    match tokio::task::spawn_blocking(move || waxworks::normalize(blob)).await {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!("normalization task failed, keeping raw capture: {e}");
            fallback
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AudioGraph, ScriptedGraph, SineGraph, StaticGraphProvider};
    use bytes::Bytes;
    use milkcrate::{BlobStore, MemoryKvStore};
    use serde_json::json;
    use tempfile::TempDir;

    fn engine_over(graph: Arc<dyn AudioGraph>, dir: &TempDir) -> CaptureEngine {
        let library = Library::open(
            Arc::new(MemoryKvStore::new()),
            BlobStore::new(dir.path()).expect("blob store"),
        );
        CaptureEngine::new(
            Arc::new(StaticGraphProvider::new(graph)),
            library,
            Arc::new(RemoteSync::disabled()),
        )
    }

    fn webm_graph() -> ScriptedGraph {
        ScriptedGraph::new(
            ["audio/webm;codecs=opus", "audio/webm"],
            "audio/webm;codecs=opus",
            vec![Bytes::from_static(b"\x1a\x45\xdf\xa3fakewebm")],
        )
    }

    #[tokio::test]
    async fn test_capture_lifecycle() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        assert_eq!(engine.state(), CaptureState::Idle);

        let id = engine.start_performance_capture().expect("start");
        assert!(id.starts_with("performance_"));
        assert!(engine.is_recording());

        engine.record_event(EventKind::CueTrigger, "deck_a", json!({"cue": 1}));
        engine.record_event(EventKind::VolumeChange, "deck_b", json!({"volume": 0.3}));

        let record = engine.stop_performance_capture().await.expect("record");
        assert_eq!(engine.state(), CaptureState::Idle);

        assert_eq!(record.id, id);
        assert_eq!(record.kind, RecordKind::Performance);
        assert!(record.is_closed());
        assert_eq!(
            record.duration_ms,
            record.end_time.expect("closed") - record.start_time
        );
        assert_eq!(record.events.len(), 2);
        assert!(record.tracks.contains("deck_a"));
        assert!(record.tracks.contains("deck_b"));

        // Opus payload can't normalize, so the original container survives
        let audio = record.audio.as_ref().expect("audio");
        assert_eq!(audio.mime_type, "audio/webm;codecs=opus");

        assert_eq!(engine.list(RecordKind::Performance).len(), 1);
    }

    #[tokio::test]
    async fn test_second_start_rejected_and_first_unaffected() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        engine.start_performance_capture().expect("start");
        engine.record_event(EventKind::LoopPlay, "deck_a", json!({}));

        let err = engine.start_performance_capture().expect_err("busy");
        assert!(matches!(err, EngineError::AlreadyRecording));
        assert!(engine.is_recording());

        let record = engine.stop_performance_capture().await.expect("record");
        assert_eq!(record.events.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        assert!(engine.stop_performance_capture().await.is_none());
        assert_eq!(engine.state(), CaptureState::Idle);
        assert!(engine.list(RecordKind::Performance).is_empty());
    }

    #[tokio::test]
    async fn test_no_graph_is_missing_audio_context() {
        let dir = TempDir::new().expect("tempdir");
        let library = Library::open(
            Arc::new(MemoryKvStore::new()),
            BlobStore::new(dir.path()).expect("blob store"),
        );
        let mut engine = CaptureEngine::new(
            Arc::new(StaticGraphProvider::empty()),
            library,
            Arc::new(RemoteSync::disabled()),
        );

        let err = engine.start_performance_capture().expect_err("no graph");
        assert!(matches!(err, EngineError::MissingAudioContext));
        assert_eq!(engine.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn test_failed_tap_leaves_engine_idle() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph().failing_tap()), &dir);

        let err = engine.start_performance_capture().expect_err("tap fails");
        assert!(matches!(err, EngineError::CaptureUnavailable { .. }));
        assert_eq!(engine.state(), CaptureState::Idle);

        // Events after the failed start go nowhere
        engine.record_event(EventKind::CueTrigger, "deck_a", json!({}));
        assert!(engine.stop_performance_capture().await.is_none());
    }

    #[tokio::test]
    async fn test_events_before_and_after_capture_are_dropped() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        engine.record_event(EventKind::CueTrigger, "deck_a", json!({"early": true}));

        engine.start_performance_capture().expect("start");
        engine.record_event(EventKind::CueTrigger, "deck_a", json!({"during": true}));
        let record = engine.stop_performance_capture().await.expect("record");

        engine.record_event(EventKind::CueTrigger, "deck_a", json!({"late": true}));

        assert_eq!(record.events.len(), 1);
        assert_eq!(record.events[0].payload["during"], true);
    }

    #[tokio::test]
    async fn test_wav_capture_normalizes_to_wav() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(SineGraph::new(440.0, 0.2)), &dir);

        engine.start_performance_capture().expect("start");
        let record = engine.stop_performance_capture().await.expect("record");

        let audio = record.audio.as_ref().expect("audio");
        assert_eq!(audio.mime_type, waxworks::WAV_MIME);
        assert_eq!(&audio.data[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn test_save_current_state() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        let record = engine.save_current_state(json!({
            "tracks": [{"id": "deck_a", "volume": 0.8}],
            "crossfader": 0.2,
        }));

        assert_eq!(record.kind, RecordKind::StateSnapshot);
        assert_eq!(record.duration_ms, 0);
        assert_eq!(record.events.len(), 1);
        assert_eq!(record.events[0].kind, EventKind::StateSave);
        assert_eq!(record.tracks.len(), 1);
        assert!(record.tracks.contains("deck_a"));

        assert_eq!(engine.list(RecordKind::StateSnapshot).len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_during_recording_leaves_capture_running() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        engine.start_performance_capture().expect("start");
        engine.save_current_state(json!({"tracks": []}));
        assert!(engine.is_recording());

        let record = engine.stop_performance_capture().await.expect("record");
        assert_eq!(record.kind, RecordKind::Performance);
        assert_eq!(engine.list(RecordKind::StateSnapshot).len(), 1);
    }

    // Deliberately not a tokio test: snapshots must work from plain
    // synchronous callers, with sync silently skipped.
    #[test]
    fn test_snapshot_outside_runtime_stays_local() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        let record = engine.save_current_state(json!({"tracks": []}));

        assert_eq!(record.kind, RecordKind::StateSnapshot);
        assert_eq!(engine.list(RecordKind::StateSnapshot).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_then_export_fails() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        engine.start_performance_capture().expect("start");
        let record = engine.stop_performance_capture().await.expect("record");

        engine.export(RecordKind::Performance, &record.id).expect("exports");
        engine.remove(RecordKind::Performance, &record.id).expect("removes");

        assert!(engine.list(RecordKind::Performance).is_empty());
        let err = engine
            .export(RecordKind::Performance, &record.id)
            .expect_err("gone");
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err = engine
            .remove(RecordKind::Performance, &record.id)
            .expect_err("gone");
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_sequential_captures_after_stop() {
        let dir = TempDir::new().expect("tempdir");
        let mut engine = engine_over(Arc::new(webm_graph()), &dir);

        let first = engine.start_performance_capture().expect("first");
        engine.stop_performance_capture().await.expect("record");

        let second = engine.start_performance_capture().expect("second");
        engine.stop_performance_capture().await.expect("record");

        assert!(first.starts_with("performance_"));
        assert_eq!(engine.list(RecordKind::Performance).len(), 2);
        // Newest first
        assert_eq!(engine.list(RecordKind::Performance)[0].id, second);
    }
}
