//! Audio capture pipeline.
//!
//! Owns the lifecycle of one tap at a time: pick a container the tap's
//! encoder supports, start streaming, gather chunks off the channel in a
//! background task, and on stop assemble them into a single blob. Chunks are
//! joined in arrival order; zero-byte flushes are dropped.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use waxworks::AudioBlob;

use crate::error::EngineError;
use crate::graph::{AudioGraph, CaptureTap};

/// Containers we ask an encoder for, most preferred first. The first one the
/// tap supports wins; if none match the tap chooses its own default.
pub const CODEC_PREFERENCES: [&str; 4] = [
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/mp4;codecs=aac",
    "audio/mp4",
];

/// A capture in flight. Consumed by [`CapturePipeline::stop`], which makes a
/// double stop of the same capture unrepresentable.
pub struct ActiveCapture {
    tap: Box<dyn CaptureTap>,
    mime_type: String,
    collector: JoinHandle<Vec<u8>>,
}

impl ActiveCapture {
    /// Container the encoder settled on.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl std::fmt::Debug for ActiveCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveCapture")
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

/// Streams one tap into one blob.
#[derive(Debug, Default)]
pub struct CapturePipeline {
    capturing: bool,
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Attach a tap to `graph` and start streaming.
    ///
    /// Nothing is mutated on failure, so a failed start leaves the pipeline
    /// ready for the next attempt.
    pub fn start(&mut self, graph: &dyn AudioGraph) -> Result<ActiveCapture, EngineError> {
        let mut tap = graph
            .create_tap()
            .map_err(|e| EngineError::CaptureUnavailable {
                reason: e.to_string(),
            })?;

        let preferred = CODEC_PREFERENCES
            .iter()
            .copied()
            .find(|mime| tap.supports_mime(mime));

        let stream = tap
            .start(preferred)
            .map_err(|e| EngineError::CaptureUnavailable {
                reason: e.to_string(),
            })?;

        debug!(mime = %stream.mime_type, preferred = ?preferred, "capture stream opened");

        let collector = tokio::spawn(collect_chunks(stream.chunks));
        self.capturing = true;

        Ok(ActiveCapture {
            tap,
            mime_type: stream.mime_type,
            collector,
        })
    }

    /// Stop the tap, wait for the last chunk to flush, and assemble the blob.
    ///
    /// Returns `None` only if the collector task died; the capture is then
    /// lost but the pipeline is reusable either way.
    pub async fn stop(&mut self, mut active: ActiveCapture) -> Option<AudioBlob> {
        active.tap.stop();

        let result = (&mut active.collector).await;
        active.tap.release();
        self.capturing = false;

        match result {
            Ok(data) => {
                debug!(bytes = data.len(), mime = %active.mime_type, "capture assembled");
                Some(AudioBlob::new(data, active.mime_type))
            }
            Err(e) => {
                error!("chunk collector failed, capture audio lost: {e}");
                None
            }
        }
    }
}

async fn collect_chunks(mut rx: mpsc::Receiver<Bytes>) -> Vec<u8> {
    let mut assembled = Vec::new();
    while let Some(chunk) = rx.recv().await {
        if chunk.is_empty() {
            continue;
        }
        assembled.extend_from_slice(&chunk);
    }
    assembled
}
