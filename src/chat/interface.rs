use async_trait::async_trait;

use crate::error::Result;

/// Reply-generation boundary. Owns the per-session conversation history;
/// the rest of the server only hands it (session id, transcript) pairs.
#[async_trait]
pub trait ReplyEngine: Send + Sync {
    /// Seed a fresh conversation for the session.
    fn initialize(&self, session_id: &str);

    /// Generate a reply to `message` in the context of the session's
    /// history, recording the new turn.
    async fn reply(&self, session_id: &str, message: &str) -> Result<String>;

    /// Release the session's history.
    fn clear(&self, session_id: &str);
}
