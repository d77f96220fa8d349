//! Audio container normalization for Encore captures.
//!
//! Capture taps hand back whatever container their encoder produced, usually
//! WebM/Opus or MP4/AAC. Downstream tools want plain WAV, so this crate
//! decodes whatever it can and re-encodes to PCM16:
//!
//! ```rust,no_run
//! use waxworks::{normalize, AudioBlob};
//!
//! let captured = AudioBlob::new(vec![0u8; 64], "audio/webm;codecs=opus");
//! let stored = normalize(captured);
//! // stored.mime_type is "audio/wav" on success, the original on failure
//! ```
//!
//! Normalization is strictly best-effort: a blob that cannot be decoded is
//! returned unchanged so the capture is never lost.

pub mod decode;
pub mod encode;

use bytes::Bytes;
use tracing::{debug, warn};

pub use decode::{decode_audio, decode_compressed, decode_wav, DecodedAudio};
pub use encode::wav_from_samples;

/// MIME type of normalized output.
pub const WAV_MIME: &str = "audio/wav";

/// A captured audio payload and the container it arrived in.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub data: Bytes,
    pub mime_type: String,
}

impl AudioBlob {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Re-encode a captured blob as PCM16 WAV.
///
/// Fails if the container cannot be decoded (no Opus decoder, truncated
/// stream, not audio at all).
pub fn try_normalize(blob: &AudioBlob) -> anyhow::Result<AudioBlob> {
    let decoded = decode::decode_audio(&blob.data)?;
    let wav = encode::wav_from_samples(&decoded)?;
    Ok(AudioBlob::new(wav, WAV_MIME))
}

/// Normalize a captured blob to WAV, keeping the original on any failure.
pub fn normalize(blob: AudioBlob) -> AudioBlob {
    match try_normalize(&blob) {
        Ok(normalized) => {
            debug!(
                from = %blob.mime_type,
                bytes = normalized.len(),
                "normalized capture to pcm wav"
            );
            normalized
        }
        Err(e) => {
            warn!(
                mime = %blob.mime_type,
                "normalization failed, keeping original container: {e:#}"
            );
            blob
        }
    }
}

/// Pick a file extension for an audio MIME type.
///
/// Substring checks run in order so "audio/webm;codecs=opus" lands on webm
/// before the opus arm sees it. Unknown types default to webm, the most
/// common capture container.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let mime = mime_type.to_ascii_lowercase();
    if mime.contains("webm") {
        "webm"
    } else if mime.contains("mp4") {
        "m4a"
    } else if mime.contains("wav") {
        "wav"
    } else if mime.contains("ogg") {
        "ogg"
    } else if mime.contains("opus") {
        "opus"
    } else {
        "webm"
    }
}
