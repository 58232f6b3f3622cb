//! Configuration loader for YAML files and environment resolution
//!
//! Secrets are never read from the YAML directly when an `*_env` variable is
//! named; they are resolved at load time so the rest of the gateway only sees
//! concrete values.

use crate::config::types::*;
use crate::errors::AgentError;
use std::env;
use std::path::Path;
use tokio::fs;

pub const ENV_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const ENV_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const ENV_OPENAI_MODEL_NAME: &str = "AZURE_OPENAI_MODEL_NAME";
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const ENV_ACCESS_TOKEN: &str = "AZURE_ACCESS_TOKEN";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, AgentError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        log::info!("Loaded configuration from {}", path.display());
        Self::from_str(&content).await
    }

    /// Load configuration from a YAML string
    pub async fn from_str(content: &str) -> Result<GatewayConfig, AgentError> {
        let mut config: GatewayConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        Self::resolve_environment(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Build a configuration purely from the process environment, after
    /// loading `.env` from the working directory when present.
    pub fn from_env() -> Result<GatewayConfig, AgentError> {
        let dotenv = Path::new(".env");
        if dotenv.exists() {
            Self::load_env_file(dotenv)?;
        }
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Assemble a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<GatewayConfig, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| {
                    AgentError::ConfigError(format!(
                        "Environment variable {} is not set",
                        key
                    ))
                })
        };

        let llm = LlmConfig {
            provider: LlmProvider::Azure,
            model: require(ENV_OPENAI_MODEL_NAME)?,
            base_url: require(ENV_OPENAI_ENDPOINT)?,
            api_version: lookup(ENV_OPENAI_API_VERSION),
            parameters: ModelParameters::default(),
            auth: LlmAuth {
                api_key: lookup(ENV_OPENAI_API_KEY),
                api_key_env: Some(ENV_OPENAI_API_KEY.to_string()),
            },
        };

        let mut management = ManagementConfig::new(require(ENV_SUBSCRIPTION_ID)?);
        management.tenant_id = lookup(ENV_TENANT_ID);
        management.auth = ManagementAuth {
            access_token: lookup(ENV_ACCESS_TOKEN),
            access_token_env: Some(ENV_ACCESS_TOKEN.to_string()),
        };

        Ok(GatewayConfig {
            llm,
            management,
            retirement: RetirementConfig::default(),
            orchestrator: OrchestratorSettings::default(),
            server: ServerSettings::default(),
            environment: EnvironmentConfig::default(),
        })
    }

    /// Resolve environment variables in the configuration
    fn resolve_environment(config: &mut GatewayConfig) -> Result<(), AgentError> {
        for env_file in &config.environment.env_files {
            if env_file.exists() {
                Self::load_env_file(env_file)?;
            } else {
                log::warn!("Env file {} not found, skipping", env_file.display());
            }
        }

        for (key, value) in &config.environment.variables {
            env::set_var(key, value);
        }

        Self::resolve_llm_auth(&mut config.llm.auth);
        Self::resolve_management_auth(&mut config.management);

        Ok(())
    }

    /// Load environment variables from a file
    pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), AgentError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::ConfigError(format!(
                "Failed to read env file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        for (key, value) in parse_env_content(&content) {
            env::set_var(key, value);
        }

        Ok(())
    }

    fn resolve_llm_auth(auth: &mut LlmAuth) {
        if let Some(env_var) = &auth.api_key_env {
            if let Ok(api_key) = env::var(env_var) {
                auth.api_key = Some(api_key);
            }
        }

        if auth.api_key.is_none() && auth.api_key_env.is_none() {
            if let Ok(api_key) = env::var(ENV_OPENAI_API_KEY) {
                auth.api_key = Some(api_key);
            } else if let Ok(api_key) = env::var("OPENAI_API_KEY") {
                auth.api_key = Some(api_key);
            }
        }
    }

    fn resolve_management_auth(management: &mut ManagementConfig) {
        let auth = &mut management.auth;
        if let Some(env_var) = &auth.access_token_env {
            if let Ok(token) = env::var(env_var) {
                auth.access_token = Some(token);
            }
        }

        if auth.access_token.is_none() && auth.access_token_env.is_none() {
            auth.access_token = env::var(ENV_ACCESS_TOKEN).ok();
        }

        if management.tenant_id.is_none() {
            management.tenant_id = env::var(ENV_TENANT_ID).ok();
        }
    }
}

/// Parse `KEY=value` lines, ignoring blanks and `#` comments.
fn parse_env_content(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim().trim_start_matches("export ").trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::update::ValidationPolicy;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
llm:
  model: gpt-4o
  base_url: https://example.openai.azure.com
  auth:
    api_key: inline-key
management:
  subscription_id: sub-123
  auth:
    access_token: inline-token
"#;

    #[tokio::test]
    async fn test_minimal_config_gets_defaults() {
        let config = ConfigLoader::from_str(MINIMAL).await.unwrap();

        assert_eq!(config.llm.provider, LlmProvider::Azure);
        assert_eq!(config.llm.auth.api_key.as_deref(), Some("inline-key"));
        assert_eq!(config.management.api_base, "https://management.azure.com");
        assert_eq!(config.management.account_kind, "AIServices");
        assert_eq!(config.management.foundry_project, "firstProject");
        assert_eq!(config.orchestrator.max_rounds, 10);
        assert_eq!(config.orchestrator.validation_policy, ValidationPolicy::Permissive);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.retirement.table_path.to_str(), Some("model_info.json"));

        let bounds = config.orchestrator.to_orchestrator_config();
        assert_eq!(bounds.time_budget, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn test_full_config_from_file() {
        let yaml = r#"
llm:
  provider: openai
  model: gpt-4o-mini
  parameters:
    temperature: 0.2
    max_tokens: 512
  auth:
    api_key_env: MODELOPS_TEST_FILE_KEY
management:
  subscription_id: sub-9
  resource_group_scope: team-rg
  poll_interval_ms: 50
  auth:
    access_token: t
orchestrator:
  max_rounds: 4
  time_budget_secs: 0
  system_prompt: You manage deployments.
  validation_policy: strict
server:
  bind_addr: 127.0.0.1:9000
environment:
  variables:
    MODELOPS_TEST_FILE_KEY: from-variables
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(file.path()).await.unwrap();
        assert_eq!(config.llm.provider, LlmProvider::OpenAI);
        assert_eq!(config.llm.parameters.max_tokens, Some(512));
        assert_eq!(config.llm.auth.api_key.as_deref(), Some("from-variables"));
        assert_eq!(config.management.resource_group_scope.as_deref(), Some("team-rg"));
        assert_eq!(config.orchestrator.validation_policy, ValidationPolicy::Strict);
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert!(config.orchestrator.to_orchestrator_config().time_budget.is_none());
    }

    #[tokio::test]
    async fn test_validation_rejects_zero_rounds() {
        let yaml = format!("{}orchestrator:\n  max_rounds: 0\n", MINIMAL);
        let err = ConfigLoader::from_str(&yaml).await.unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[tokio::test]
    async fn test_validation_rejects_polling_longer_than_time_budget() {
        // Management is the last section of MINIMAL, so these lines extend it.
        let polling = "  poll_interval_ms: 1000\n  max_poll_attempts: 30\n";
        let yaml = format!("{}{}orchestrator:\n  time_budget_secs: 30\n", MINIMAL, polling);
        let err = ConfigLoader::from_str(&yaml).await.unwrap_err();
        assert!(err.to_string().contains("time budget"));

        let yaml = format!("{}{}orchestrator:\n  time_budget_secs: 31\n", MINIMAL, polling);
        assert!(ConfigLoader::from_str(&yaml).await.is_ok());

        let yaml = format!("{}{}orchestrator:\n  time_budget_secs: 0\n", MINIMAL, polling);
        assert!(ConfigLoader::from_str(&yaml).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_subscription() {
        let yaml = MINIMAL.replace("sub-123", "\"\"");
        assert!(matches!(
            ConfigLoader::from_str(&yaml).await,
            Err(AgentError::ConfigError(_))
        ));
    }

    #[test]
    fn test_from_lookup_reads_azure_variables() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_OPENAI_ENDPOINT, "https://res.openai.azure.com"),
            (ENV_OPENAI_API_KEY, "k"),
            (ENV_OPENAI_MODEL_NAME, "gpt-4o"),
            (ENV_SUBSCRIPTION_ID, "sub"),
            (ENV_ACCESS_TOKEN, "tok"),
            (ENV_TENANT_ID, "tenant"),
        ]);
        let config =
            ConfigLoader::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.llm.base_url, "https://res.openai.azure.com");
        assert_eq!(config.llm.api_version_or_default(), "2024-10-21");
        assert_eq!(config.management.auth.access_token.as_deref(), Some("tok"));
        assert_eq!(config.management.tenant_id.as_deref(), Some("tenant"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_requires_subscription() {
        let err = ConfigLoader::from_lookup(|k| match k {
            ENV_OPENAI_ENDPOINT => Some("https://x".to_string()),
            ENV_OPENAI_MODEL_NAME => Some("m".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_SUBSCRIPTION_ID));
    }

    #[test]
    fn test_parse_env_content() {
        let parsed = parse_env_content(
            "# comment\n\nA=1\nexport B=\"two\"\nC='three'\nnot a pair\n",
        );
        assert_eq!(parsed, vec![("A", "1"), ("B", "two"), ("C", "three")]);
    }
}
