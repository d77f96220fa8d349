//! Record and event types for captured performances.
//!
//! A `CaptureRecord` is assembled once, when its capture closes, and never
//! mutated afterwards. Field names serialize camelCase to stay readable next
//! to the mixer snapshots that end up in the same exports.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use waxworks::AudioBlob;

/// What happened at the desk while the capture was rolling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    CueTrigger,
    LoopPlay,
    LoopStop,
    VolumeChange,
    SpeedChange,
    FilterChange,
    /// Synthetic marker carried by state snapshot records.
    StateSave,
}

/// One control action, timestamped relative to capture start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingEvent {
    /// Milliseconds since the capture began.
    pub timestamp_ms: u64,
    pub kind: EventKind,
    pub track_id: String,
    /// Kind-specific details (cue name, loop bounds, new volume, ...).
    pub payload: Value,
}

/// The three shapes a record can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// Audio plus the correlated event log.
    Performance,
    /// Audio only, no event log. Kept for imported legacy captures.
    AudioRecording,
    /// A point-in-time mixer snapshot, no audio.
    StateSnapshot,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Performance,
        RecordKind::AudioRecording,
        RecordKind::StateSnapshot,
    ];

    /// Prefix used when minting record ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            RecordKind::Performance => "performance",
            RecordKind::AudioRecording => "recording",
            RecordKind::StateSnapshot => "session",
        }
    }

    /// Collection name this kind is stored under.
    pub fn storage_key(self) -> &'static str {
        match self {
            RecordKind::Performance => "performances",
            RecordKind::AudioRecording => "recordings",
            RecordKind::StateSnapshot => "sessions",
        }
    }

    /// Mint an id from a capture start time.
    pub fn generate_id(self, epoch_ms: u64) -> String {
        format!("{}_{}", self.id_prefix(), epoch_ms)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Performance => "performance",
            RecordKind::AudioRecording => "audio recording",
            RecordKind::StateSnapshot => "state snapshot",
        };
        write!(f, "{name}")
    }
}

/// An immutable, closed capture.
///
/// The audio payload never serializes with the record; it lives in the blob
/// store and is re-attached on export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    pub id: String,
    pub kind: RecordKind,
    /// Wall-clock start, epoch milliseconds.
    pub start_time: u64,
    /// Wall-clock end. Always present once sealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    pub duration_ms: u64,
    pub events: Vec<RecordingEvent>,
    /// Distinct track ids touched during the capture.
    pub tracks: BTreeSet<String>,
    #[serde(skip)]
    pub audio: Option<AudioBlob>,
}

impl CaptureRecord {
    /// Seal a performance capture.
    pub fn performance(
        id: String,
        start_time: u64,
        end_time: u64,
        events: Vec<RecordingEvent>,
        tracks: BTreeSet<String>,
        audio: Option<AudioBlob>,
    ) -> Self {
        Self {
            id,
            kind: RecordKind::Performance,
            start_time,
            end_time: Some(end_time),
            duration_ms: end_time.saturating_sub(start_time),
            events,
            tracks,
            audio,
        }
    }

    /// Build a state snapshot record around a mixer state document.
    ///
    /// The snapshot itself becomes the payload of a single synthetic
    /// `StateSave` event; track ids are lifted from the document's `tracks`
    /// array when present.
    pub fn snapshot(id: String, epoch_ms: u64, state: Value) -> Self {
        let tracks = snapshot_tracks(&state);
        let event = RecordingEvent {
            timestamp_ms: 0,
            kind: EventKind::StateSave,
            track_id: "mixer".to_string(),
            payload: state,
        };

        Self {
            id,
            kind: RecordKind::StateSnapshot,
            start_time: epoch_ms,
            end_time: Some(epoch_ms),
            duration_ms: 0,
            events: vec![event],
            tracks,
            audio: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

fn snapshot_tracks(state: &Value) -> BTreeSet<String> {
    state
        .get("tracks")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.get("id").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
