//! Audio primitives: fixed-duration PCM frames and the device seams.

mod capture;
mod playback;
pub mod wav;

pub use capture::MicCapture;
pub use playback::ReplyPlayer;

use async_trait::async_trait;

use crate::error::Result;

/// One immutable fixed-duration chunk of 16-bit little-endian PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    sample_rate: u32,
    channels: u16,
    payload: Vec<u8>,
}

impl AudioFrame {
    pub fn new(sample_rate: u32, channels: u16, payload: Vec<u8>) -> Self {
        Self {
            sample_rate,
            channels,
            payload,
        }
    }

    pub fn from_samples(sample_rate: u32, channels: u16, samples: &[i16]) -> Self {
        let mut payload = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        Self {
            sample_rate,
            channels,
            payload,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn samples(&self) -> Vec<i16> {
        self.payload
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    pub fn duration_ms(&self) -> u64 {
        let samples = (self.payload.len() / 2) as u64;
        let per_channel = samples / u64::from(self.channels.max(1));
        per_channel * 1000 / u64::from(self.sample_rate.max(1))
    }
}

/// Source of capture frames. The microphone is the production impl; tests
/// substitute scripted sources.
#[async_trait(?Send)]
pub trait FrameSource {
    async fn next_frame(&mut self) -> Result<AudioFrame>;

    /// Drop any audio buffered before the current listening phase began.
    fn flush(&mut self) {}
}

/// Consumer of one complete encoded reply payload.
pub trait ReplySink {
    fn play(&mut self, audio: &[u8]) -> Result<()>;
}
