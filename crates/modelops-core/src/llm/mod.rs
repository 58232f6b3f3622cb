//! Language model provider abstractions.
//!
//! Defines the `LLM` trait the conversation loop talks to and the metadata
//! describing each tool advertised to the model. Provider implementations live
//! in [`providers`].

pub use crate::core_types::{LLMResponse, Message};
use crate::errors::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod providers;

pub use providers::openai::OpenAIClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait LLM: Send + Sync {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError>;
}
