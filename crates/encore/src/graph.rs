//! Seams to the live mixing engine's audio graph.
//!
//! The engine never talks to an audio backend directly. It asks an
//! [`AudioGraphProvider`] for the currently live graph, asks the graph for a
//! [`CaptureTap`] on its master output, and reads encoded chunks off the
//! stream the tap hands back. Real deployments implement these traits over
//! whatever their mixer exposes; [`SineGraph`] and [`ScriptedGraph`] cover
//! demos and tests.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use bytes::Bytes;
use tokio::sync::mpsc;

use waxworks::{wav_from_samples, DecodedAudio};

/// Where capture taps come from.
pub trait AudioGraphProvider: Send + Sync {
    /// The graph currently driving the speakers, if any.
    fn active_graph(&self) -> Option<Arc<dyn AudioGraph>>;
}

/// A live audio graph that can host capture taps on its master output.
pub trait AudioGraph: Send + Sync {
    fn create_tap(&self) -> Result<Box<dyn CaptureTap>>;
}

/// An open capture stream.
pub struct CaptureStream {
    /// Container the encoder actually produced.
    pub mime_type: String,
    /// Encoded chunks, closed once the final chunk has flushed after `stop`.
    pub chunks: mpsc::Receiver<Bytes>,
}

/// A recorder attached to a graph's master output.
pub trait CaptureTap: Send {
    /// Whether the tap's encoder can produce this container.
    fn supports_mime(&self, mime_type: &str) -> bool;

    /// Begin streaming, preferring `preferred` when given. With `None` the
    /// tap picks its own default container.
    fn start(&mut self, preferred: Option<&str>) -> Result<CaptureStream>;

    /// Ask the encoder to flush and close the stream. Idempotent; calling
    /// before `start` is a no-op.
    fn stop(&mut self);

    /// Detach from the graph. The tap cannot start again afterwards.
    fn release(&mut self);
}

/// Provider over a fixed graph, or over nothing at all.
pub struct StaticGraphProvider {
    graph: Option<Arc<dyn AudioGraph>>,
}

impl StaticGraphProvider {
    pub fn new(graph: Arc<dyn AudioGraph>) -> Self {
        Self { graph: Some(graph) }
    }

    /// A provider with no live graph, for hosts that haven't started audio.
    pub fn empty() -> Self {
        Self { graph: None }
    }
}

impl AudioGraphProvider for StaticGraphProvider {
    fn active_graph(&self) -> Option<Arc<dyn AudioGraph>> {
        self.graph.clone()
    }
}

/// Graph that renders a sine tone and streams it as WAV chunks.
///
/// Backs the demo command and the end-to-end tests; there is no real mixer
/// behind it.
pub struct SineGraph {
    frequency: f32,
    seconds: f32,
    sample_rate: u32,
}

impl SineGraph {
    pub fn new(frequency: f32, seconds: f32) -> Self {
        Self {
            frequency,
            seconds,
            sample_rate: 44100,
        }
    }

    fn render_wav(&self) -> Result<Vec<u8>> {
        let frames = (self.seconds * self.sample_rate as f32) as usize;
        let samples: Vec<f32> = (0..frames)
            .map(|i| {
                let t = i as f32 / self.sample_rate as f32;
                (2.0 * std::f32::consts::PI * self.frequency * t).sin() * 0.5
            })
            .collect();

        wav_from_samples(&DecodedAudio {
            samples,
            sample_rate: self.sample_rate,
            channels: 1,
        })
    }
}

impl AudioGraph for SineGraph {
    fn create_tap(&self) -> Result<Box<dyn CaptureTap>> {
        Ok(Box::new(SineTap {
            data: self.render_wav()?,
            started: false,
            released: false,
        }))
    }
}

const SINE_CHUNK_BYTES: usize = 32 * 1024;

struct SineTap {
    data: Vec<u8>,
    started: bool,
    released: bool,
}

impl CaptureTap for SineTap {
    fn supports_mime(&self, mime_type: &str) -> bool {
        mime_type.eq_ignore_ascii_case("audio/wav")
    }

    fn start(&mut self, _preferred: Option<&str>) -> Result<CaptureStream> {
        if self.released {
            return Err(anyhow!("tap already released"));
        }
        self.started = true;

        let chunks: Vec<Bytes> = self
            .data
            .chunks(SINE_CHUNK_BYTES)
            .map(Bytes::copy_from_slice)
            .collect();

        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(CaptureStream {
            mime_type: "audio/wav".to_string(),
            chunks: rx,
        })
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// What a [`ScriptedTap`] saw, for assertions.
#[derive(Debug, Default)]
pub struct TapLog {
    /// The `preferred` argument of each `start` call.
    pub started_with: Vec<Option<String>>,
    pub stop_calls: u32,
    pub released: bool,
}

/// Graph whose taps serve canned chunks and record every call.
///
/// Test double in the spirit of an in-memory store: construct with the
/// containers the fake encoder "supports" and the chunks it should stream.
pub struct ScriptedGraph {
    supported: Vec<String>,
    chunks: Vec<Bytes>,
    stream_mime: String,
    fail_tap: bool,
    fail_start: bool,
    log: Arc<Mutex<TapLog>>,
}

impl ScriptedGraph {
    pub fn new(
        supported: impl IntoIterator<Item = &'static str>,
        stream_mime: &str,
        chunks: Vec<Bytes>,
    ) -> Self {
        Self {
            supported: supported.into_iter().map(String::from).collect(),
            chunks,
            stream_mime: stream_mime.to_string(),
            fail_tap: false,
            fail_start: false,
            log: Arc::new(Mutex::new(TapLog::default())),
        }
    }

    /// Make `create_tap` fail.
    pub fn failing_tap(mut self) -> Self {
        self.fail_tap = true;
        self
    }

    /// Make `start` fail after the tap is handed out.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Shared view of the calls taps have seen.
    pub fn log(&self) -> Arc<Mutex<TapLog>> {
        Arc::clone(&self.log)
    }
}

impl AudioGraph for ScriptedGraph {
    fn create_tap(&self) -> Result<Box<dyn CaptureTap>> {
        if self.fail_tap {
            return Err(anyhow!("no capture node available"));
        }
        Ok(Box::new(ScriptedTap {
            supported: self.supported.clone(),
            chunks: self.chunks.clone(),
            stream_mime: self.stream_mime.clone(),
            fail_start: self.fail_start,
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedTap {
    supported: Vec<String>,
    chunks: Vec<Bytes>,
    stream_mime: String,
    fail_start: bool,
    log: Arc<Mutex<TapLog>>,
}

impl CaptureTap for ScriptedTap {
    fn supports_mime(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|m| m == mime_type)
    }

    fn start(&mut self, preferred: Option<&str>) -> Result<CaptureStream> {
        self.log
            .lock()
            .unwrap()
            .started_with
            .push(preferred.map(String::from));

        if self.fail_start {
            return Err(anyhow!("encoder refused to start"));
        }

        let chunks = self.chunks.clone();
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(CaptureStream {
            mime_type: self.stream_mime.clone(),
            chunks: rx,
        })
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().stop_calls += 1;
    }

    fn release(&mut self) {
        self.log.lock().unwrap().released = true;
    }
}
