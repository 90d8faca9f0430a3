use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::interface::Synthesizer;
use crate::error::{Error, Result};

/// Anything smaller than this is not a usable audio payload.
const MIN_AUDIO_BYTES: usize = 1024;

/// Synthesis client posting text to a remote endpoint that answers with
/// encoded audio bytes.
#[derive(Debug, Clone)]
pub struct RemoteSynthesizer {
    client: Client,
    url: String,
}

impl RemoteSynthesizer {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Synthesizer for RemoteSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({"text": text, "voice": voice}))
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?
            .to_vec();

        if audio.len() < MIN_AUDIO_BYTES {
            return Err(Error::Synthesis(format!(
                "undersized audio payload ({} bytes)",
                audio.len()
            )));
        }

        debug!(bytes = audio.len(), "synthesis result");
        Ok(audio)
    }
}
