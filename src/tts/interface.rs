use async_trait::async_trait;

use crate::error::Result;

/// Speech synthesis boundary.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `text` with the given voice and return the encoded audio
    /// payload. Empty or undersized output is a hard failure.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}
