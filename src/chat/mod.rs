mod client;
mod history;
mod interface;

pub use client::ChatClient;
pub use history::{ChatMessage, ConversationStore};
pub use interface::ReplyEngine;
