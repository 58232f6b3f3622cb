//! Backend trait the HTTP handlers drive.

use async_trait::async_trait;
use modelops_core::{ChatEventStream, Message, Orchestrator};

use crate::error::{Result, ServerError};

#[async_trait]
pub trait ChatBackend: Send + Sync + Clone + 'static {
    /// Run the conversation to completion and return the final assistant message.
    async fn chat(&self, messages: Vec<Message>) -> Result<Message>;

    /// Run the conversation, emitting progress events. The stream ends with
    /// exactly one `final` or `error` event.
    async fn chat_stream(&self, messages: Vec<Message>) -> Result<ChatEventStream>;

    async fn validate_input(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Err(ServerError::invalid_request("Messages cannot be empty"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for Orchestrator {
    async fn chat(&self, messages: Vec<Message>) -> Result<Message> {
        Ok(self.run(messages).await?)
    }

    async fn chat_stream(&self, messages: Vec<Message>) -> Result<ChatEventStream> {
        Ok(self.run_stream(messages))
    }
}
