// src/test_utils/mock_llm.rs
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::core_types::{LLMResponse, Message, ToolCall};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};

pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

/// LLM double that replays scripted responses in order and records what it was sent.
#[derive(Default)]
pub struct MockLLM {
    script: Mutex<VecDeque<Result<LLMResponse, AgentError>>>,
    repeat: Option<LLMResponse>,
    delay: Option<Duration>,
    received: Mutex<Vec<Vec<Message>>>,
    advertised: Mutex<Vec<Vec<String>>>,
}

impl MockLLM {
    pub fn scripted(responses: Vec<LLMResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// Answer every round with the same response.
    pub fn repeating(response: LLMResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Default::default()
        }
    }

    pub fn failing(error: AgentError) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(error)])),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn rounds(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().unwrap().clone()
    }

    pub fn advertised_tools(&self) -> Vec<Vec<String>> {
        self.advertised.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLM for MockLLM {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        self.received.lock().unwrap().push(messages);
        self.advertised.lock().unwrap().push(
            tools
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.name)
                .collect(),
        );

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.repeat
            .clone()
            .ok_or_else(|| AgentError::LLMError("MockLLM script exhausted".to_string()))
    }
}
