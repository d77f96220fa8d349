//! Event log correlator.
//!
//! Stamps control events against a monotonic capture-start reference so the
//! log can be replayed in lockstep with the captured audio. Wall-clock time
//! never feeds event timestamps; clock steps must not reorder the log.

use std::collections::BTreeSet;
use std::time::Instant;

use serde_json::Value;
use tracing::trace;

use crate::model::{EventKind, RecordingEvent};

/// Everything the correlator collected for one capture.
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    /// In arrival order, timestamps non-decreasing.
    pub events: Vec<RecordingEvent>,
    /// Distinct track ids across all events.
    pub tracks: BTreeSet<String>,
}

/// Collects events between `begin_capture` and `end_capture`.
///
/// Outside that window every `record_event` is a silent no-op, so callers
/// can forward desk actions unconditionally.
#[derive(Debug, Default)]
pub struct EventCorrelator {
    started: Option<Instant>,
    events: Vec<RecordingEvent>,
    tracks: BTreeSet<String>,
}

impl EventCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a capture window. Any leftovers from an earlier window are
    /// discarded.
    pub fn begin_capture(&mut self) {
        self.started = Some(Instant::now());
        self.events.clear();
        self.tracks.clear();
    }

    pub fn is_open(&self) -> bool {
        self.started.is_some()
    }

    /// Append an event stamped relative to capture start.
    pub fn record_event(&mut self, kind: EventKind, track_id: &str, payload: Value) {
        let Some(started) = self.started else {
            return;
        };

        let timestamp_ms = started.elapsed().as_millis() as u64;
        trace!(?kind, track_id, timestamp_ms, "event recorded");

        self.tracks.insert(track_id.to_string());
        self.events.push(RecordingEvent {
            timestamp_ms,
            kind,
            track_id: track_id.to_string(),
            payload,
        });
    }

    /// Close the window and hand back everything collected.
    pub fn end_capture(&mut self) -> CapturedEvents {
        self.started = None;
        CapturedEvents {
            events: std::mem::take(&mut self.events),
            tracks: std::mem::take(&mut self.tracks),
        }
    }
}
