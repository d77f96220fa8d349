//! PCM16 WAV encoding.
//!
//! Output is the plain 44-byte RIFF/WAVE header followed by little-endian
//! interleaved 16-bit samples, the lowest common denominator every DAW and
//! browser can open.

use std::io::Cursor;

use anyhow::{bail, Context, Result};

use crate::decode::DecodedAudio;

/// Convert one float sample to a 16-bit code.
///
/// Out-of-range input clamps to full scale. The two sides scale differently
/// (-32768 vs 32767) so both rails are reachable.
pub(crate) fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

/// Encode decoded audio as a PCM16 WAV byte stream.
pub fn wav_from_samples(audio: &DecodedAudio) -> Result<Vec<u8>> {
    if audio.channels == 0 {
        bail!("cannot encode audio with zero channels");
    }

    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, spec).context("failed to create WAV writer")?;

    for &sample in &audio.samples {
        writer
            .write_sample(sample_to_i16(sample))
            .context("failed to write WAV sample")?;
    }

    writer.finalize().context("failed to finalize WAV")?;
    Ok(cursor.into_inner())
}
