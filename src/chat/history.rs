use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Bounded per-session conversation histories, keyed by session id.
///
/// Trimming is a pure tail-keep: once a conversation grows past
/// `max_history` entries it is cut down to the most recent
/// `trim_history_to`, the seeded system message included.
pub struct ConversationStore {
    conversations: DashMap<String, Vec<ChatMessage>>,
    system_prompt: String,
    max_history: usize,
    trim_history_to: usize,
}

impl ConversationStore {
    pub fn new(system_prompt: String, max_history: usize, trim_history_to: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            system_prompt,
            max_history,
            trim_history_to,
        }
    }

    pub fn initialize(&self, session_id: &str) {
        self.conversations.insert(
            session_id.to_string(),
            vec![ChatMessage::system(self.system_prompt.clone())],
        );
    }

    /// Append the user message and return the conversation to send.
    pub fn push_user(&self, session_id: &str, content: &str) -> Vec<ChatMessage> {
        let mut entry = self
            .conversations
            .entry(session_id.to_string())
            .or_insert_with(|| vec![ChatMessage::system(self.system_prompt.clone())]);
        entry.push(ChatMessage::user(content));
        entry.clone()
    }

    /// Record the assistant turn and enforce the history bound.
    pub fn push_assistant(&self, session_id: &str, content: &str) {
        if let Some(mut entry) = self.conversations.get_mut(session_id) {
            entry.push(ChatMessage::assistant(content));
            if entry.len() > self.max_history {
                let excess = entry.len().saturating_sub(self.trim_history_to);
                entry.drain(..excess);
            }
        }
    }

    pub fn clear(&self, session_id: &str) {
        self.conversations.remove(session_id);
    }

    pub fn len(&self, session_id: &str) -> usize {
        self.conversations
            .get(session_id)
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }

    #[cfg(test)]
    fn snapshot(&self, session_id: &str) -> Vec<ChatMessage> {
        self.conversations
            .get(session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}
