//! Resource-management collaborator boundary.
//!
//! The gateway never talks to the cloud control plane directly; every read and
//! write goes through [`ResourceManager`]. Each call returns an explicit
//! `Result` so callers decide whether a failure ends the conversation or is
//! reported back to the model as data. [`arm::ArmClient`] is the production
//! implementation over the Azure Resource Manager REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod arm;

pub use arm::ArmClient;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ManagementError {
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Management API returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Deployment '{deployment}' finished provisioning in state '{state}'")]
    ProvisioningFailed { deployment: String, state: String },
    #[error("Management request failed: {0}")]
    Transport(String),
    #[error("Failed to decode management response: {0}")]
    Decode(String),
    #[error("Management authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for ManagementError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ManagementError::Decode(err.to_string())
        } else {
            ManagementError::Transport(err.to_string())
        }
    }
}

/// Account that owns deployments, as returned by account enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
}

/// Addressing triple of a remote deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIdentity {
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub deployment_name: String,
}

impl DeploymentIdentity {
    pub fn new(
        resource_group: impl Into<String>,
        account_name: impl Into<String>,
        deployment_name: impl Into<String>,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            account_name: account_name.into(),
            deployment_name: deployment_name.into(),
        }
    }

    /// Name of the first empty addressing field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.resource_group.trim().is_empty() {
            Some("resource_group")
        } else if self.account_name.trim().is_empty() {
            Some("account_name")
        } else if self.deployment_name.trim().is_empty() {
            Some("deployment_name")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    pub model: DeploymentModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rai_policy_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limits: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_upgrade_option: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    pub properties: DeploymentProperties,
}

/// Body of a create-or-update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentUpdate {
    pub sku: Sku,
    pub properties: DeploymentProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageName {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub localized_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub name: UsageName,
    #[serde(default)]
    pub current_value: Option<f64>,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>, ManagementError>;

    async fn list_deployments(&self, account: &Account)
        -> Result<Vec<Deployment>, ManagementError>;

    async fn get_deployment(
        &self,
        identity: &DeploymentIdentity,
    ) -> Result<Deployment, ManagementError>;

    /// Submit the update and wait until provisioning settles.
    async fn create_or_update_deployment(
        &self,
        identity: &DeploymentIdentity,
        update: &DeploymentUpdate,
    ) -> Result<Deployment, ManagementError>;

    async fn list_usages(&self, location: &str) -> Result<Vec<QuotaUsage>, ManagementError>;
}
