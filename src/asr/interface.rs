use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

/// Speech recognition boundary. The engine itself is an opaque network
/// service; this crate only ships audio to it and reads text back.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe one WAV payload.
    ///
    /// A malformed or non-success response is a hard failure. Callers on
    /// the dialogue path downgrade that to an empty transcript; the
    /// wake-word path surfaces it.
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String>;
}

#[derive(Debug, Deserialize)]
pub struct RecognitionEntry {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct RecognitionResponse {
    #[serde(default)]
    pub result: Vec<RecognitionEntry>,
}
