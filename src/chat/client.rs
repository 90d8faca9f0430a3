use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::history::ConversationStore;
use super::interface::ReplyEngine;
use crate::config::GptConfig;
use crate::error::{Error, Result};

/// Reply generation against an OpenAI-compatible chat completions endpoint.
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    store: ConversationStore,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl ChatClient {
    pub fn new(config: &GptConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            store: ConversationStore::new(
                config.system_prompt.clone(),
                config.max_history,
                config.trim_history_to,
            ),
        }
    }
}

#[async_trait]
impl ReplyEngine for ChatClient {
    fn initialize(&self, session_id: &str) {
        self.store.initialize(session_id);
    }

    async fn reply(&self, session_id: &str, message: &str) -> Result<String> {
        let messages = self.store.push_user(session_id, message);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({"model": self.model, "messages": messages}))
            .send()
            .await
            .map_err(|e| Error::Reply(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Reply(e.to_string()))?;

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Reply(format!("malformed response: {e}")))?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Reply("response carried no choices".to_string()))?;

        self.store.push_assistant(session_id, &reply);
        debug!(session_id, reply = %reply, "reply generated");
        Ok(reply)
    }

    fn clear(&self, session_id: &str) {
        self.store.clear(session_id);
    }
}
