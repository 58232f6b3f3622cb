//! Administrative tools the model may call.
//!
//! The tool set is closed: [`ToolKind`] has one variant per tool and both the
//! capability registry sent to the model and the dispatch table are derived
//! from it, so the two cannot drift apart. Handler failures (bad arguments,
//! missing deployments, remote errors) come back as structured JSON results;
//! only an unregistered tool name is an `Err`.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

use crate::errors::{tool_failure, AgentError, FailureKind};
use crate::llm::ToolMetadata;
use crate::management::ResourceManager;

pub mod deployments;
pub mod quota;
pub mod retirement;
pub mod update;

pub use deployments::{DeploymentFilters, DeploymentReader, DeploymentSummary};
pub use quota::QuotaReader;
pub use retirement::{ModelVersion, RetirementRecord, RetirementTable};
pub use update::{
    BatchReport, BatchSummary, DeploymentUpdater, FoundryLinks, UpdateFields, UpdateOutcome,
    UpdateRequest, ValidationPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListDeployments,
    RetirementInfo,
    UpdateDeployments,
    QuotaUsage,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::ListDeployments,
        ToolKind::RetirementInfo,
        ToolKind::UpdateDeployments,
        ToolKind::QuotaUsage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListDeployments => "get_deployed_models",
            ToolKind::RetirementInfo => "get_model_retirement_info",
            ToolKind::UpdateDeployments => "update_model_deployments",
            ToolKind::QuotaUsage => "get_quota_usage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn metadata(self) -> ToolMetadata {
        let string_list = |description: &str| {
            json!({"type": "array", "items": {"type": "string"}, "description": description})
        };

        let (description, input_schema) = match self {
            ToolKind::ListDeployments => (
                "Get detail information about all deployed OpenAI models, optionally filtered.",
                json!({
                    "type": "object",
                    "properties": {
                        "model_filter": string_list("Only include these model names"),
                        "sku_filter": string_list("Only include these SKU names"),
                        "location_filter": string_list("Only include these regions"),
                        "account_filter": string_list("Only include these account names"),
                        "resource_group_filter": string_list("Only include these resource groups")
                    },
                    "required": []
                }),
            ),
            ToolKind::RetirementInfo => (
                "Look up the retirement date and recommended replacement for model versions.",
                json!({
                    "type": "object",
                    "properties": {
                        "models": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "model_name": {"type": "string"},
                                    "version": {"type": "string"}
                                },
                                "required": ["model_name", "version"]
                            }
                        }
                    },
                    "required": ["models"]
                }),
            ),
            ToolKind::UpdateDeployments => (
                "Update the model and/or SKU of one or more deployments. Unspecified fields keep their current values.",
                json!({
                    "type": "object",
                    "properties": {
                        "updates": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "resource_group": {"type": "string"},
                                    "account_name": {"type": "string"},
                                    "deployment_name": {"type": "string"},
                                    "new_model_name": {"type": "string"},
                                    "new_model_version": {"type": "string"},
                                    "new_sku_name": {"type": "string"},
                                    "new_sku_capacity": {"type": "integer"}
                                },
                                "required": ["resource_group", "account_name", "deployment_name"]
                            }
                        }
                    },
                    "required": ["updates"]
                }),
            ),
            ToolKind::QuotaUsage => (
                "Get quota usage and limits for a region.",
                json!({
                    "type": "object",
                    "properties": {
                        "location": {"type": "string", "description": "Azure region, e.g. eastus"}
                    },
                    "required": ["location"]
                }),
            ),
        };

        ToolMetadata {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

#[derive(Deserialize)]
struct RetirementArgs {
    models: Vec<ModelVersion>,
}

#[derive(Deserialize)]
struct UpdateArgs {
    updates: Vec<Value>,
}

#[derive(Deserialize)]
struct QuotaArgs {
    location: String,
}

/// A tool call with its arguments decoded into the shape its handler expects.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    ListDeployments(DeploymentFilters),
    RetirementInfo(Vec<ModelVersion>),
    UpdateDeployments(Vec<Value>),
    QuotaUsage(String),
}

impl ToolInvocation {
    /// Decode arguments for `kind`. The error is a human-readable reason.
    pub fn parse(kind: ToolKind, arguments: Value) -> Result<Self, String> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let invalid =
            |e: serde_json::Error| format!("Invalid arguments for {}: {}", kind.name(), e);

        match kind {
            ToolKind::ListDeployments => serde_json::from_value(arguments)
                .map(ToolInvocation::ListDeployments)
                .map_err(invalid),
            ToolKind::RetirementInfo => serde_json::from_value::<RetirementArgs>(arguments)
                .map(|a| ToolInvocation::RetirementInfo(a.models))
                .map_err(invalid),
            ToolKind::UpdateDeployments => serde_json::from_value::<UpdateArgs>(arguments)
                .map(|a| ToolInvocation::UpdateDeployments(a.updates))
                .map_err(invalid),
            ToolKind::QuotaUsage => {
                let args = serde_json::from_value::<QuotaArgs>(arguments).map_err(invalid)?;
                if args.location.trim().is_empty() {
                    return Err("Missing required field: location".to_string());
                }
                Ok(ToolInvocation::QuotaUsage(args.location))
            }
        }
    }
}

pub struct ToolDispatcher {
    reader: DeploymentReader,
    retirement: Arc<RetirementTable>,
    updater: DeploymentUpdater,
    quota: QuotaReader,
}

impl ToolDispatcher {
    pub fn new(manager: Arc<dyn ResourceManager>, retirement: Arc<RetirementTable>) -> Self {
        Self {
            reader: DeploymentReader::new(manager.clone()),
            retirement,
            updater: DeploymentUpdater::new(manager.clone()),
            quota: QuotaReader::new(manager),
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.updater = self.updater.with_policy(policy);
        self
    }

    pub fn with_links(mut self, links: FoundryLinks) -> Self {
        self.updater = self.updater.with_links(links);
        self
    }

    /// Capability registry advertised to the model.
    pub fn capabilities(&self) -> Vec<ToolMetadata> {
        ToolKind::ALL.into_iter().map(ToolKind::metadata).collect()
    }

    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value, AgentError> {
        self.dispatch_until(name, arguments, None).await
    }

    /// Like [`dispatch`](Self::dispatch); batch updates not started by `deadline`
    /// are reported as skipped.
    pub async fn dispatch_until(
        &self,
        name: &str,
        arguments: Value,
        deadline: Option<Instant>,
    ) -> Result<Value, AgentError> {
        let kind =
            ToolKind::from_name(name).ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        log::debug!("Dispatching {} with arguments {}", name, arguments);

        match ToolInvocation::parse(kind, arguments) {
            Ok(invocation) => self.execute_until(invocation, deadline).await,
            Err(reason) => {
                log::warn!("{}", reason);
                Ok(tool_failure(FailureKind::Validation, reason))
            }
        }
    }

    pub async fn execute(&self, invocation: ToolInvocation) -> Result<Value, AgentError> {
        self.execute_until(invocation, None).await
    }

    async fn execute_until(
        &self,
        invocation: ToolInvocation,
        deadline: Option<Instant>,
    ) -> Result<Value, AgentError> {
        let value = match invocation {
            ToolInvocation::ListDeployments(filters) => match self.reader.list(&filters).await {
                Ok(deployments) => to_json(&deployments)?,
                Err(e) => tool_failure(FailureKind::from_management(&e), e.to_string()),
            },
            ToolInvocation::RetirementInfo(models) => {
                to_json(&self.retirement.lookup_all(&models))?
            }
            ToolInvocation::UpdateDeployments(updates) => {
                to_json(&self.updater.batch_update_values_until(updates, deadline).await)?
            }
            ToolInvocation::QuotaUsage(location) => match self.quota.quota(&location).await {
                Ok(usages) => to_json(&usages)?,
                Err(e) => tool_failure(FailureKind::from_management(&e), e.to_string()),
            },
        };
        Ok(value)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, AgentError> {
    serde_json::to_value(value)
        .map_err(|e| AgentError::InternalError(format!("Failed to serialize tool result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_management::{deployment, MockResourceManager};

    fn dispatcher() -> ToolDispatcher {
        let manager = Arc::new(
            MockResourceManager::new()
                .with_account("acct", "rg", "eastus")
                .with_deployment("acct", deployment("chat", "gpt-4o", "2024-05-13", "Standard", 10))
                .with_usage("eastus", "OpenAI.Standard.gpt-4o", 10.0, 100.0),
        );
        let table = RetirementTable::from_json_str(
            r#"{"gpt-4o": {"2024-05-13": {"retirement_date": "2025-10-15", "replacement_model": "gpt-4.1"}}}"#,
        )
        .unwrap();
        ToolDispatcher::new(manager, Arc::new(table))
    }

    #[test]
    fn test_names_round_trip_and_registry_matches() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        let names: Vec<_> = dispatcher().capabilities().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "get_deployed_models",
                "get_model_retirement_info",
                "update_model_deployments",
                "get_quota_usage"
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_hard_error() {
        let err = dispatcher().dispatch("delete_everything", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(ref n) if n == "delete_everything"));
    }

    #[tokio::test]
    async fn test_bad_arguments_are_structured_validation_failures() {
        let value = dispatcher()
            .dispatch("get_quota_usage", json!({"region": "eastus"}))
            .await
            .unwrap();
        assert_eq!(value["error_kind"], "validation");

        let value = dispatcher()
            .dispatch("get_quota_usage", json!({"location": ""}))
            .await
            .unwrap();
        assert_eq!(value["error"], "Missing required field: location");
    }

    #[tokio::test]
    async fn test_list_with_null_arguments() {
        let value = dispatcher().dispatch("get_deployed_models", Value::Null).await.unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["deployment_name"], "chat");
        assert_eq!(value[0]["capacity"], 10);
    }

    #[tokio::test]
    async fn test_retirement_and_quota() {
        let d = dispatcher();
        let value = d
            .dispatch(
                "get_model_retirement_info",
                json!({"models": [
                    {"model_name": "gpt-4o", "version": "2024-05-13"},
                    {"model_name": "gpt-4o", "version": "0000"}
                ]}),
            )
            .await
            .unwrap();
        assert_eq!(value[0]["replacement_model"], "gpt-4.1");
        assert_eq!(value[1]["error"], "Version '0000' not found for model 'gpt-4o'.");

        let value = d.dispatch("get_quota_usage", json!({"location": "eastus"})).await.unwrap();
        assert_eq!(value[0]["limit"], 100.0);
    }

    #[tokio::test]
    async fn test_update_reports_results_and_summary() {
        let value = dispatcher()
            .dispatch(
                "update_model_deployments",
                json!({"updates": [
                    {"resource_group": "rg", "account_name": "acct", "deployment_name": "chat", "new_sku_capacity": 20}
                ]}),
            )
            .await
            .unwrap();
        assert_eq!(value["results"][0]["success"], true);
        assert_eq!(value["results"][0]["deployment_info"]["deployment_name"], "chat");
        assert_eq!(value["summary"]["success_rate"], "100.0%");
    }
}
