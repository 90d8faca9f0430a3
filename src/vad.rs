//! Frame-level speech/silence classification.

use tracing::warn;
use webrtc_vad::{SampleRate, Vad, VadMode};

use crate::audio::AudioFrame;
use crate::error::{Error, Result};

/// Classifies one fixed-duration frame as speech or silence.
///
/// A failed classification is reported and treated as silence; it never
/// propagates past this boundary.
pub trait SpeechClassifier {
    fn is_speech(&mut self, frame: &AudioFrame) -> bool;
}

pub struct SpeechDetector {
    vad: Vad,
}

impl SpeechDetector {
    pub fn new(sample_rate: u32, aggressiveness: u8) -> Result<Self> {
        let rate = match sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => {
                return Err(Error::Config(format!(
                    "unsupported sample rate for speech detection: {other}"
                )))
            }
        };
        let mode = match aggressiveness {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => {
                return Err(Error::Config(format!(
                    "vad aggressiveness must be 0-3, got {other}"
                )))
            }
        };

        Ok(Self {
            vad: Vad::new_with_rate_and_mode(rate, mode),
        })
    }
}

impl SpeechClassifier for SpeechDetector {
    fn is_speech(&mut self, frame: &AudioFrame) -> bool {
        let samples = frame.samples();
        match self.vad.is_voice_segment(&samples) {
            Ok(voiced) => voiced,
            Err(_) => {
                warn!(
                    frame_samples = samples.len(),
                    "speech detection failed, treating frame as silence"
                );
                false
            }
        }
    }
}
