//! End-to-end capture flows over real storage.
//!
//! These tests verify:
//! - A full capture produces a normalized, durable, exportable record
//! - Records survive engine restarts and re-attach their audio on export
//! - Compressed captures keep their container and export under it
//! - Snapshots and sync notices work through the public surface

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use serde_json::json;
use tempfile::TempDir;

use encore::engine::{CaptureEngine, CaptureState};
use encore::graph::{AudioGraph, ScriptedGraph, SineGraph, StaticGraphProvider};
use encore::library::Library;
use encore::model::{EventKind, RecordKind};
use encore::sync::{RemoteRef, RemoteSync, SyncBackend, SyncPayload};
use milkcrate::{BlobStore, FileKvStore, KvStore};

fn library_at(state_dir: &Path) -> Library {
    let kv: Arc<dyn KvStore> =
        Arc::new(FileKvStore::new(state_dir.join("collections")).expect("kv store"));
    let blobs = BlobStore::new(state_dir.join("blobs")).expect("blob store");
    Library::open(kv, blobs)
}

fn engine_at(state_dir: &Path, graph: Arc<dyn AudioGraph>) -> CaptureEngine {
    CaptureEngine::new(
        Arc::new(StaticGraphProvider::new(graph)),
        library_at(state_dir),
        Arc::new(RemoteSync::disabled()),
    )
}

#[tokio::test]
async fn test_sine_capture_to_export() -> Result<()> {
    let state = TempDir::new()?;
    let mut engine = engine_at(state.path(), Arc::new(SineGraph::new(440.0, 0.25)));

    let id = engine.start_performance_capture()?;
    assert_eq!(engine.state(), CaptureState::Recording);

    engine.record_event(EventKind::CueTrigger, "deck_a", json!({"cue": 1}));
    engine.record_event(EventKind::LoopPlay, "deck_a", json!({"bars": 4}));
    engine.record_event(EventKind::VolumeChange, "deck_b", json!({"volume": 0.6}));

    let record = engine
        .stop_performance_capture()
        .await
        .expect("capture closes into a record");
    assert_eq!(engine.state(), CaptureState::Idle);

    // Sealed record reflects what happened
    assert_eq!(record.id, id);
    assert!(record.is_closed());
    assert_eq!(record.events.len(), 3);
    assert_eq!(
        record.tracks,
        BTreeSet::from(["deck_a".to_string(), "deck_b".to_string()])
    );
    for pair in record.events.windows(2) {
        assert!(pair[0].timestamp_ms <= pair[1].timestamp_ms);
    }

    // WAV capture normalizes to PCM WAV
    let audio = record.audio.as_ref().expect("audio captured");
    assert_eq!(audio.mime_type, "audio/wav");
    let decoded = waxworks::decode_audio(&audio.data)?;
    assert_eq!(decoded.sample_rate, 44100);

    // Export writes coherent names
    let bundle = engine.export(RecordKind::Performance, &id)?;
    assert_eq!(bundle.metadata_name, format!("encore_{id}.json"));
    let export_audio = bundle.audio.expect("audio exported");
    assert_eq!(export_audio.file_name, format!("encore_{id}.wav"));

    let metadata: serde_json::Value = serde_json::from_slice(&bundle.metadata)?;
    assert_eq!(metadata["id"], id.as_str());
    assert_eq!(metadata["kind"], "Performance");
    assert!(metadata.get("audio").is_none());

    Ok(())
}

#[tokio::test]
async fn test_records_survive_restart() -> Result<()> {
    let state = TempDir::new()?;

    let id = {
        let mut engine = engine_at(state.path(), Arc::new(SineGraph::new(330.0, 0.1)));
        engine.start_performance_capture()?;
        engine.record_event(EventKind::SpeedChange, "deck_a", json!({"rate": 1.02}));
        let record = engine
            .stop_performance_capture()
            .await
            .expect("record");
        record.id
    };

    // Fresh engine over the same state directory
    let engine = engine_at(state.path(), Arc::new(SineGraph::new(330.0, 0.1)));

    let records = engine.list(RecordKind::Performance);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].events.len(), 1);
    // Audio stays on disk, not in memory
    assert!(records[0].audio.is_none());

    // Export re-attaches the stored blob
    let bundle = engine.export(RecordKind::Performance, &id)?;
    let audio = bundle.audio.expect("audio reloaded from blob store");
    assert_eq!(&audio.blob.data[0..4], b"RIFF");

    Ok(())
}

#[tokio::test]
async fn test_compressed_capture_keeps_container() -> Result<()> {
    let state = TempDir::new()?;
    let graph = ScriptedGraph::new(
        ["audio/webm;codecs=opus"],
        "audio/webm;codecs=opus",
        vec![
            Bytes::from_static(b"\x1a\x45\xdf\xa3"),
            Bytes::from_static(b"opuspayload"),
        ],
    );
    let log = graph.log();
    let mut engine = engine_at(state.path(), Arc::new(graph));

    let id = engine.start_performance_capture()?;
    let record = engine
        .stop_performance_capture()
        .await
        .expect("record");

    // The preferred container was requested from the tap
    assert_eq!(
        log.lock().unwrap().started_with,
        vec![Some("audio/webm;codecs=opus".to_string())]
    );

    // No Opus decoder, so normalization degrades to the original bytes
    let audio = record.audio.as_ref().expect("audio kept");
    assert_eq!(audio.mime_type, "audio/webm;codecs=opus");
    assert_eq!(&audio.data[..], b"\x1a\x45\xdf\xa3opuspayload");

    let bundle = engine.export(RecordKind::Performance, &id)?;
    assert_eq!(
        bundle.audio.expect("audio").file_name,
        format!("encore_{id}.webm")
    );

    Ok(())
}

#[tokio::test]
async fn test_snapshot_flow_with_sync() -> Result<()> {
    struct CapturingBackend {
        seen: std::sync::Mutex<Vec<SyncPayload>>,
    }

    #[async_trait::async_trait]
    impl SyncBackend for CapturingBackend {
        async fn push(&self, payload: &SyncPayload) -> Result<RemoteRef> {
            self.seen.lock().unwrap().push(payload.clone());
            Ok(RemoteRef {
                user_id: "user_1".to_string(),
                session_id: "remote_1".to_string(),
                recording_id: None,
            })
        }
    }

    let state = TempDir::new()?;
    let backend = Arc::new(CapturingBackend {
        seen: std::sync::Mutex::new(Vec::new()),
    });
    let sync = Arc::new(RemoteSync::new(backend.clone()));
    let mut notices = sync.subscribe();

    let mut engine = CaptureEngine::new(
        Arc::new(StaticGraphProvider::empty()),
        library_at(state.path()),
        sync,
    );

    let record = engine.save_current_state(json!({
        "tracks": [{"id": "deck_a"}, {"id": "deck_b"}],
        "crossfader": 0.4,
    }));

    assert_eq!(record.kind, RecordKind::StateSnapshot);
    assert_eq!(record.duration_ms, 0);
    assert_eq!(record.events.len(), 1);
    assert_eq!(record.events[0].kind, EventKind::StateSave);
    assert_eq!(record.tracks.len(), 2);

    // Sync runs in the background; the notice proves it landed
    let notice = notices.recv().await.expect("sync notice");
    assert_eq!(notice.record_id, record.id);
    assert_eq!(notice.remote.session_id, "remote_1");
    assert_eq!(backend.seen.lock().unwrap().len(), 1);

    // Snapshots never capture audio
    let bundle = engine.export(RecordKind::StateSnapshot, &record.id)?;
    assert!(bundle.audio.is_none());

    Ok(())
}

#[tokio::test]
async fn test_capture_without_graph_changes_nothing() -> Result<()> {
    let state = TempDir::new()?;
    let mut engine = CaptureEngine::new(
        Arc::new(StaticGraphProvider::empty()),
        library_at(state.path()),
        Arc::new(RemoteSync::disabled()),
    );

    assert!(engine.start_performance_capture().is_err());
    assert_eq!(engine.state(), CaptureState::Idle);
    assert!(engine.stop_performance_capture().await.is_none());
    assert!(engine.list(RecordKind::Performance).is_empty());

    Ok(())
}
