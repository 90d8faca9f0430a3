//! Wake-word gated listening: accumulate candidate utterances until one of
//! them transcribes to something containing a configured keyword.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::asr::Recognizer;
use crate::audio::{wav, FrameSource};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::segment::{SegmentEvent, UtteranceSegmenter};
use crate::vad::{SpeechClassifier, SpeechDetector};

pub struct WakeWordListener {
    wake_word: String,
    keywords: Vec<String>,
    max_silence_frames: u32,
    listen_timeout: Option<Duration>,
    detector: Box<dyn SpeechClassifier>,
}

impl WakeWordListener {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let detector = SpeechDetector::new(config.audio.rate, config.vad.aggressiveness)?;
        Ok(Self::new(
            config.wakeup.word.clone(),
            config.wakeup.keywords.clone(),
            config.wake_silence_frames(),
            config.wakeup.listen_timeout_ms,
            Box::new(detector),
        ))
    }

    pub fn new(
        wake_word: String,
        keywords: Vec<String>,
        max_silence_frames: u32,
        listen_timeout_ms: Option<u64>,
        detector: Box<dyn SpeechClassifier>,
    ) -> Self {
        Self {
            wake_word,
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .collect(),
            max_silence_frames,
            listen_timeout: listen_timeout_ms.map(Duration::from_millis),
            detector,
        }
    }

    /// Listen until woken, returning the waking transcript.
    ///
    /// Runs indefinitely unless a listen timeout is configured. Recognition
    /// failures are hard failures here; the caller decides whether to keep
    /// listening.
    pub async fn listen(
        &mut self,
        mic: &mut dyn FrameSource,
        recognizer: &dyn Recognizer,
    ) -> Result<String> {
        let mut segmenter = UtteranceSegmenter::new(self.max_silence_frames);
        let deadline = self.listen_timeout.map(|t| Instant::now() + t);
        mic.flush();

        info!(wake_word = %self.wake_word, "listening for wake word");
        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::ListenTimeout);
                }
            }

            let frame = mic.next_frame().await?;
            let is_speech = self.detector.is_speech(&frame);
            if let SegmentEvent::Completed(frames) = segmenter.push(frame, is_speech) {
                debug!(frames = frames.len(), "utterance captured, checking for wake word");
                let audio = wav::frames_to_wav(&frames)?;
                let transcript = recognizer.transcribe(audio).await?;

                if self.matches(&transcript) {
                    info!(transcript = %transcript, "wake word detected");
                    return Ok(transcript);
                }
                debug!(transcript = %transcript, "no wake word, still listening");
            }
        }
    }

    fn matches(&self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();
        self.keywords.iter().any(|k| normalized.contains(k))
    }
}
