//! Canonical WAV container for shipping utterances to recognition.

use std::io::Cursor;

use crate::audio::AudioFrame;
use crate::error::{Error, Result};

/// Encode raw 16-bit PCM into a WAV container.
pub fn pcm_to_wav(payload: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(e.to_string()))?;
        for pair in payload.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Encode an ordered utterance into one WAV payload. Frame order is
/// preserved; rate and channel count come from the first frame.
pub fn frames_to_wav(frames: &[AudioFrame]) -> Result<Vec<u8>> {
    let first = frames
        .first()
        .ok_or_else(|| Error::Audio("cannot encode an empty utterance".to_string()))?;
    let mut payload = Vec::new();
    for frame in frames {
        payload.extend_from_slice(frame.payload());
    }
    pcm_to_wav(&payload, first.sample_rate(), first.channels())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: u32,
    pub duration_ms: u64,
}

/// Read back container metadata, mostly for sanity checks and tests.
pub fn probe(bytes: &[u8]) -> Result<WavInfo> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let sample_count = reader.len();
    let per_channel = sample_count / u32::from(spec.channels.max(1));
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        sample_count,
        duration_ms: u64::from(per_channel) * 1000 / u64::from(spec.sample_rate.max(1)),
    })
}
