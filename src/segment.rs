//! Utterance segmentation shared by wake-word listening and dialogue
//! capture: an utterance opens on the first speech frame and closes once
//! the trailing silence run exceeds the configured threshold.

use crate::audio::AudioFrame;

#[derive(Debug, PartialEq, Eq)]
pub enum SegmentEvent {
    /// Frame consumed, utterance still idle or accumulating.
    None,
    /// This frame opened a new utterance.
    Opened,
    /// The silence threshold was exceeded; the bounded utterance is handed
    /// back in capture order and the segmenter returns to idle.
    Completed(Vec<AudioFrame>),
}

pub struct UtteranceSegmenter {
    frames: Vec<AudioFrame>,
    speech_started: bool,
    silence_run: u32,
    max_silence_frames: u32,
}

impl UtteranceSegmenter {
    pub fn new(max_silence_frames: u32) -> Self {
        Self {
            frames: Vec::new(),
            speech_started: false,
            silence_run: 0,
            max_silence_frames,
        }
    }

    pub fn push(&mut self, frame: AudioFrame, is_speech: bool) -> SegmentEvent {
        if is_speech {
            let opened = !self.speech_started;
            self.speech_started = true;
            self.silence_run = 0;
            self.frames.push(frame);
            return if opened {
                SegmentEvent::Opened
            } else {
                SegmentEvent::None
            };
        }

        if !self.speech_started {
            // Leading silence is not part of any utterance.
            return SegmentEvent::None;
        }

        self.silence_run += 1;
        self.frames.push(frame);
        if self.silence_run > self.max_silence_frames {
            let frames = std::mem::take(&mut self.frames);
            self.reset();
            return SegmentEvent::Completed(frames);
        }

        SegmentEvent::None
    }

    pub fn is_open(&self) -> bool {
        self.speech_started
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.speech_started = false;
        self.silence_run = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> AudioFrame {
        AudioFrame::from_samples(16000, 1, &[0i16; 480])
    }

    #[test]
    fn leading_silence_is_discarded() {
        let mut segmenter = UtteranceSegmenter::new(3);
        for _ in 0..10 {
            assert_eq!(segmenter.push(frame(), false), SegmentEvent::None);
        }
        assert!(!segmenter.is_open());
    }

    #[test]
    fn first_speech_opens_the_utterance() {
        let mut segmenter = UtteranceSegmenter::new(3);
        assert_eq!(segmenter.push(frame(), true), SegmentEvent::Opened);
        assert_eq!(segmenter.push(frame(), true), SegmentEvent::None);
        assert!(segmenter.is_open());
    }

    #[test]
    fn interior_silence_below_threshold_keeps_accumulating() {
        let mut segmenter = UtteranceSegmenter::new(3);
        segmenter.push(frame(), true);
        for _ in 0..3 {
            assert_eq!(segmenter.push(frame(), false), SegmentEvent::None);
        }
        // Speech resumes before the run exceeds the threshold.
        assert_eq!(segmenter.push(frame(), true), SegmentEvent::None);
        assert!(segmenter.is_open());
    }

    #[test]
    fn silence_run_past_threshold_completes_the_utterance() {
        let mut segmenter = UtteranceSegmenter::new(15);
        for _ in 0..5 {
            segmenter.push(frame(), true);
        }
        let mut completed = None;
        for i in 0..20 {
            if let SegmentEvent::Completed(frames) = segmenter.push(frame(), false) {
                completed = Some((i, frames));
                break;
            }
        }
        // The sixteenth consecutive silent frame exceeds a threshold of 15.
        let (index, frames) = completed.expect("utterance never completed");
        assert_eq!(index, 15);
        assert_eq!(frames.len(), 5 + 16);
        assert!(!segmenter.is_open());
    }

    #[test]
    fn frames_are_returned_in_capture_order() {
        let mut segmenter = UtteranceSegmenter::new(1);
        let tagged: Vec<AudioFrame> = (0..4)
            .map(|i| AudioFrame::from_samples(16000, 1, &[i as i16; 480]))
            .collect();
        segmenter.push(tagged[0].clone(), true);
        segmenter.push(tagged[1].clone(), true);
        segmenter.push(tagged[2].clone(), false);
        match segmenter.push(tagged[3].clone(), false) {
            SegmentEvent::Completed(frames) => assert_eq!(frames, tagged),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn completion_resets_for_the_next_utterance() {
        let mut segmenter = UtteranceSegmenter::new(0);
        segmenter.push(frame(), true);
        assert!(matches!(
            segmenter.push(frame(), false),
            SegmentEvent::Completed(_)
        ));
        assert_eq!(segmenter.push(frame(), true), SegmentEvent::Opened);
    }
}
