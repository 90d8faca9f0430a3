use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tracing::{debug, error};

use crate::audio::{AudioFrame, FrameSource};
use crate::config::AudioConfig;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Captures fixed-duration frames from the default input device.
pub struct MicCapture {
    stream: Option<Stream>,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    sample_rate: u32,
    channels: u16,
    chunk_samples: usize,
}

impl MicCapture {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let mut capture = Self {
            stream: None,
            buffer: Arc::new(Mutex::new(VecDeque::new())),
            sample_rate: config.rate,
            channels: config.channels,
            chunk_samples: config.chunk_samples() * config.channels as usize,
        };
        capture.start()?;
        Ok(capture)
    }

    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == self.channels
                    && c.min_sample_rate() <= SampleRate(self.sample_rate)
                    && c.max_sample_rate() >= SampleRate(self.sample_rate)
            })
            .ok_or_else(|| {
                Error::Audio(format!(
                    "no {} Hz / {}ch input config available",
                    self.sample_rate, self.channels
                ))
            })?;
        let stream_config: StreamConfig = supported
            .with_sample_rate(SampleRate(self.sample_rate))
            .config();

        let buffer = Arc::clone(&self.buffer);
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16),
                        );
                    }
                },
                |err| {
                    error!(error = %err, "microphone capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        debug!(
            rate = self.sample_rate,
            channels = self.channels,
            "microphone capture started"
        );
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!("microphone capture stopped");
        }
    }
}

#[async_trait(?Send)]
impl FrameSource for MicCapture {
    async fn next_frame(&mut self) -> Result<AudioFrame> {
        loop {
            {
                let mut buf = self
                    .buffer
                    .lock()
                    .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))?;
                if buf.len() >= self.chunk_samples {
                    let samples: Vec<i16> = buf.drain(..self.chunk_samples).collect();
                    return Ok(AudioFrame::from_samples(
                        self.sample_rate,
                        self.channels,
                        &samples,
                    ));
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn flush(&mut self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}
