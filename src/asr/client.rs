use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;

use super::interface::{RecognitionResponse, Recognizer};
use crate::error::{Error, Result};

/// Recognition client posting WAV files to a remote transcription endpoint.
#[derive(Debug, Clone)]
pub struct RemoteRecognizer {
    client: Client,
    url: String,
}

impl RemoteRecognizer {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Recognizer for RemoteRecognizer {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String> {
        let part = Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Recognition(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Recognition(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Recognition(e.to_string()))?;

        let body: RecognitionResponse = response
            .json()
            .await
            .map_err(|e| Error::Recognition(format!("malformed response: {e}")))?;

        let text = body
            .result
            .into_iter()
            .next()
            .map(|entry| entry.text)
            .ok_or_else(|| Error::Recognition("response carried no result".to_string()))?;

        debug!(transcript = %text, "recognition result");
        Ok(text)
    }
}
