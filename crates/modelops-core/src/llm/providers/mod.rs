//! LLM provider implementations
//!
//! Every supported provider speaks the chat-completions protocol; they differ
//! in addressing and authentication, which [`openai::ApiStyle`] captures.

use std::sync::Arc;

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::AgentError;
use crate::llm::LLM;

pub mod openai;

/// Create an LLM client based on the provider configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    validate_provider_config(config)?;
    match config.provider {
        LlmProvider::Azure => openai::create_azure_client(config),
        LlmProvider::OpenAI => openai::create_client(config),
        LlmProvider::Custom => openai::create_custom_client(config),
    }
}

/// Validate provider-specific configuration
pub fn validate_provider_config(config: &LlmConfig) -> Result<(), AgentError> {
    if config.auth.api_key.is_none() {
        return Err(AgentError::ConfigError(format!(
            "{:?} provider requires either 'api_key' or 'api_key_env'",
            config.provider
        )));
    }

    match config.provider {
        LlmProvider::Azure | LlmProvider::Custom => {
            if config.base_url.trim().is_empty() {
                return Err(AgentError::ConfigError(format!(
                    "{:?} provider requires a valid 'base_url'",
                    config.provider
                )));
            }
        }
        LlmProvider::OpenAI => {}
    }

    Ok(())
}
