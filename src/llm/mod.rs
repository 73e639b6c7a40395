//! Chat-completion backends.
pub mod groq;
pub mod scripted;

use async_trait::async_trait;
use thiserror::Error;

use crate::session::ChatMessage;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Something that turns a conversation into the assistant's next reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Model name for logging.
    fn name(&self) -> &str;
}
