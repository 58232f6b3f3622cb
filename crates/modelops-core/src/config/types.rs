//! Configuration types for the gateway
//!
//! Every section has serde defaults so a minimal YAML file only needs the
//! endpoint, model and subscription.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AgentError;
use crate::llm::providers::openai::DEFAULT_AZURE_API_VERSION;
use crate::management::arm::{
    DEFAULT_ACCOUNT_KIND, DEFAULT_ARM_API_BASE, DEFAULT_COGNITIVE_API_VERSION,
};
use crate::orchestrator::OrchestratorConfig;
use crate::tools::update::ValidationPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub llm: LlmConfig,
    pub management: ManagementConfig,
    #[serde(default)]
    pub retirement: RetirementConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    /// Azure resource endpoint, or the API base for OpenAI-compatible providers.
    #[serde(default)]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub auth: LlmAuth,
}

impl LlmConfig {
    pub fn api_version_or_default(&self) -> String {
        self.api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Azure,
    #[serde(rename = "openai")]
    OpenAI,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmAuth {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementConfig {
    #[serde(default = "default_arm_api_base")]
    pub api_base: String,
    pub subscription_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub auth: ManagementAuth,
    #[serde(default = "default_account_kind")]
    pub account_kind: String,
    /// Restrict account enumeration to a single resource group.
    #[serde(default)]
    pub resource_group_scope: Option<String>,
    #[serde(default = "default_management_api_version")]
    pub api_version: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_foundry_project")]
    pub foundry_project: String,
}

impl ManagementConfig {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            api_base: default_arm_api_base(),
            subscription_id: subscription_id.into(),
            tenant_id: None,
            auth: ManagementAuth::default(),
            account_kind: default_account_kind(),
            resource_group_scope: None,
            api_version: default_management_api_version(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            foundry_project: default_foundry_project(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagementAuth {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub access_token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetirementConfig {
    #[serde(default = "default_table_path")]
    pub table_path: PathBuf,
}

impl Default for RetirementConfig {
    fn default() -> Self {
        Self {
            table_path: default_table_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Wall-clock budget for one conversation; 0 disables it.
    #[serde(default = "default_time_budget_secs")]
    pub time_budget_secs: u64,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub validation_policy: ValidationPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            time_budget_secs: default_time_budget_secs(),
            system_prompt: None,
            validation_policy: ValidationPolicy::default(),
        }
    }
}

impl OrchestratorSettings {
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_rounds: self.max_rounds,
            time_budget: (self.time_budget_secs > 0)
                .then(|| Duration::from_secs(self.time_budget_secs)),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_sse_keepalive_secs")]
    pub sse_keepalive_secs: u64,
    #[serde(default = "default_true")]
    pub enable_logging: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origins: default_cors_origins(),
            sse_keepalive_secs: default_sse_keepalive_secs(),
            enable_logging: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub env_files: Vec<PathBuf>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl GatewayConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.llm.model.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "LLM model cannot be empty".to_string(),
            ));
        }

        if self.llm.provider == LlmProvider::Azure && self.llm.base_url.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "Azure LLM endpoint (base_url) cannot be empty".to_string(),
            ));
        }

        if self.management.subscription_id.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "Management subscription_id cannot be empty".to_string(),
            ));
        }

        if self.orchestrator.max_rounds == 0 {
            return Err(AgentError::ConfigError(
                "Orchestrator max_rounds must be greater than 0".to_string(),
            ));
        }

        if self.management.max_poll_attempts == 0 {
            return Err(AgentError::ConfigError(
                "Management max_poll_attempts must be greater than 0".to_string(),
            ));
        }

        // A single update's polling must fit inside the conversation budget.
        let budget_ms = self.orchestrator.time_budget_secs.saturating_mul(1000);
        let polling_ms = self
            .management
            .poll_interval_ms
            .saturating_mul(u64::from(self.management.max_poll_attempts));
        if budget_ms > 0 && polling_ms >= budget_ms {
            return Err(AgentError::ConfigError(format!(
                "Management polling ({} ms x {} attempts) must be shorter than the \
                 orchestrator time budget of {} s",
                self.management.poll_interval_ms,
                self.management.max_poll_attempts,
                self.orchestrator.time_budget_secs
            )));
        }

        Ok(())
    }
}

fn default_arm_api_base() -> String {
    DEFAULT_ARM_API_BASE.to_string()
}

fn default_account_kind() -> String {
    DEFAULT_ACCOUNT_KIND.to_string()
}

fn default_management_api_version() -> String {
    DEFAULT_COGNITIVE_API_VERSION.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_poll_attempts() -> u32 {
    45
}

fn default_foundry_project() -> String {
    "firstProject".to_string()
}

fn default_table_path() -> PathBuf {
    PathBuf::from("model_info.json")
}

fn default_max_rounds() -> usize {
    10
}

fn default_time_budget_secs() -> u64 {
    120
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_sse_keepalive_secs() -> u64 {
    15
}

fn default_true() -> bool {
    true
}
