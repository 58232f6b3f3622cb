use crate::core_types::{LLMResponse, Message, Role, ToolCall, Usage};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use async_trait::async_trait;
use reqwest::Client;

use serde_json::{json, Value};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// How requests are addressed and authenticated.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiStyle {
    /// `{api_base}/chat/completions` with a bearer token.
    Bearer,
    /// `{endpoint}/openai/deployments/{model}/chat/completions?api-version=...`
    /// with an `api-key` header.
    Azure { api_version: String },
}

#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    style: ApiStyle,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            model,
            style: ApiStyle::Bearer,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Client for an Azure OpenAI resource; `model` is the deployment name.
    pub fn azure(endpoint: String, api_key: String, model: String, api_version: String) -> Self {
        Self::new(api_key, model)
            .with_api_base(endpoint)
            .with_style(ApiStyle::Azure { api_version })
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_style(mut self, style: ApiStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn completions_url(&self) -> String {
        match &self.style {
            ApiStyle::Bearer => format!("{}/chat/completions", self.api_base),
            ApiStyle::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.api_base,
                urlencoding::encode(&self.model),
                urlencoding::encode(api_version)
            ),
        }
    }

    fn build_request_body(&self, messages: &[Message], tools: Option<&[ToolMetadata]>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(messages),
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if let Some(tools) = tools {
            if !tools.is_empty() {
                log::debug!("Advertising {} tools to the model", tools.len());
                let formatted_tools: Vec<Value> = tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.input_schema
                            }
                        })
                    })
                    .collect();
                body["tools"] = formatted_tools.into();
                body["tool_choice"] = "auto".into();
            }
        }

        body
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let mut message = json!({
                    "role": self.format_role(&msg.role),
                    "content": msg.content
                });

                if let Role::Tool = msg.role {
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        message["tool_call_id"] = json!(tool_call_id);
                    }
                }

                if let Role::Assistant = msg.role {
                    if let Some(tool_calls) = msg.tool_calls.as_ref().filter(|c| !c.is_empty()) {
                        let formatted_tool_calls: Vec<Value> = tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments.to_string()
                                    }
                                })
                            })
                            .collect();
                        message["tool_calls"] = json!(formatted_tool_calls);
                    }
                }

                message
            })
            .collect()
    }

    fn format_role(&self, role: &Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[async_trait]
impl LLM for OpenAIClient {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, AgentError> {
        let url = self.completions_url();
        let body = self.build_request_body(&messages, tools.as_deref());

        log::debug!("Chat completions request to {} with {} messages", url, messages.len());
        log::trace!(
            "Request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let request = self.client.post(&url).json(&body);
        let request = match self.style {
            ApiStyle::Bearer => request.bearer_auth(&self.api_key),
            ApiStyle::Azure { .. } => request.header("api-key", &self.api_key),
        };

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::LLMError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| AgentError::LLMError(format!("Failed to read response: {}", e)))?;

        log::debug!("Chat completions response status {}", status);

        if !status.is_success() {
            return Err(AgentError::LLMError(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| AgentError::ParsingError(format!("Invalid JSON response: {}", e)))?;

        parse_response(response_json)
    }
}

/// Extract the first choice of a chat-completions response.
pub fn parse_response(response: Value) -> Result<LLMResponse, AgentError> {
    let choices = response["choices"]
        .as_array()
        .ok_or_else(|| AgentError::ParsingError("No choices in response".to_string()))?;

    let choice = choices
        .first()
        .ok_or_else(|| AgentError::ParsingError("Empty choices array".to_string()))?;
    let message = &choice["message"];

    let content = message["content"].as_str().map(|s| s.to_string());
    let finish_reason = choice["finish_reason"].as_str().map(|s| s.to_string());

    let tool_calls = match message["tool_calls"].as_array() {
        Some(calls) => {
            let mut parsed_calls = Vec::with_capacity(calls.len());
            for call in calls {
                let id = call["id"].as_str().ok_or_else(|| {
                    AgentError::ParsingError("Tool call without an id".to_string())
                })?;
                let name = call["function"]["name"].as_str().ok_or_else(|| {
                    AgentError::ParsingError(format!("Tool call '{}' has no function name", id))
                })?;
                let arguments = match call["function"]["arguments"].as_str() {
                    Some(raw) if !raw.trim().is_empty() => {
                        serde_json::from_str(raw).map_err(|e| {
                            AgentError::ParsingError(format!(
                                "Invalid tool call arguments JSON for '{}': {}",
                                name, e
                            ))
                        })?
                    }
                    _ => json!({}),
                };

                parsed_calls.push(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                });
            }
            if parsed_calls.is_empty() {
                None
            } else {
                Some(parsed_calls)
            }
        }
        None => None,
    };

    let usage = response
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

    Ok(LLMResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
    })
}

/// Create an OpenAI LLM client from configuration
pub fn create_client(
    config: &crate::config::LlmConfig,
) -> Result<std::sync::Arc<dyn LLM>, AgentError> {
    let mut client = OpenAIClient::new(api_key(config)?, config.model.clone());
    if !config.base_url.trim().is_empty() {
        client = client.with_api_base(config.base_url.clone());
    }
    Ok(std::sync::Arc::new(apply_parameters(client, config)))
}

/// Create an Azure OpenAI client from configuration
pub fn create_azure_client(
    config: &crate::config::LlmConfig,
) -> Result<std::sync::Arc<dyn LLM>, AgentError> {
    let client = OpenAIClient::azure(
        config.base_url.clone(),
        api_key(config)?,
        config.model.clone(),
        config.api_version_or_default(),
    );
    Ok(std::sync::Arc::new(apply_parameters(client, config)))
}

/// Create an OpenAI-compatible client for custom endpoints
pub fn create_custom_client(
    config: &crate::config::LlmConfig,
) -> Result<std::sync::Arc<dyn LLM>, AgentError> {
    let client = OpenAIClient::new(api_key(config)?, config.model.clone())
        .with_api_base(config.base_url.clone());
    Ok(std::sync::Arc::new(apply_parameters(client, config)))
}

fn api_key(config: &crate::config::LlmConfig) -> Result<String, AgentError> {
    config.auth.api_key.clone().ok_or_else(|| {
        AgentError::ConfigError(
            "No API key found for the LLM provider. Set api_key or api_key_env".to_string(),
        )
    })
}

fn apply_parameters(mut client: OpenAIClient, config: &crate::config::LlmConfig) -> OpenAIClient {
    if let Some(temperature) = config.parameters.temperature {
        client = client.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.parameters.max_tokens {
        client = client.with_max_tokens(max_tokens);
    }
    client
}
