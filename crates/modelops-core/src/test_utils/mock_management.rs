// src/test_utils/mock_management.rs
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::management::{
    Account, Deployment, DeploymentIdentity, DeploymentModel, DeploymentProperties,
    DeploymentUpdate, ManagementError, QuotaUsage, ResourceManager, Sku, UsageName,
};

pub fn deployment(name: &str, model: &str, version: &str, sku: &str, capacity: i64) -> Deployment {
    Deployment {
        id: None,
        name: name.to_string(),
        sku: Some(Sku {
            name: sku.to_string(),
            capacity: Some(capacity),
        }),
        properties: DeploymentProperties {
            model: DeploymentModel {
                format: Some("OpenAI".to_string()),
                name: model.to_string(),
                version: Some(version.to_string()),
            },
            provisioning_state: Some("Succeeded".to_string()),
            capabilities: Some(serde_json::json!({"chatCompletion": "true"})),
            rai_policy_name: Some("Microsoft.DefaultV2".to_string()),
            rate_limits: None,
            version_upgrade_option: Some("OnceNewDefaultVersionAvailable".to_string()),
            current_capacity: Some(capacity),
        },
    }
}

/// In-memory resource manager keyed by account name.
#[derive(Default)]
pub struct MockResourceManager {
    accounts: Vec<Account>,
    deployments: Mutex<HashMap<String, Vec<Deployment>>>,
    usages: HashMap<String, Vec<QuotaUsage>>,
    failing_lists: HashSet<String>,
    failing_updates: HashSet<String>,
    slow_updates: HashMap<String, Duration>,
    updates: Mutex<Vec<(DeploymentIdentity, DeploymentUpdate)>>,
}

impl MockResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, name: &str, resource_group: &str, location: &str) -> Self {
        self.accounts.push(Account {
            id: format!("/subscriptions/sub-1/resourceGroups/{}/accounts/{}", resource_group, name),
            name: name.to_string(),
            subscription_id: "sub-1".to_string(),
            resource_group: resource_group.to_string(),
            location: location.to_string(),
        });
        self
    }

    pub fn with_deployment(self, account: &str, deployment: Deployment) -> Self {
        self.deployments
            .lock()
            .unwrap()
            .entry(account.to_string())
            .or_default()
            .push(deployment);
        self
    }

    pub fn with_usage(mut self, location: &str, name: &str, current: f64, limit: f64) -> Self {
        self.usages
            .entry(location.to_string())
            .or_default()
            .push(QuotaUsage {
                name: UsageName {
                    value: Some(name.to_string()),
                    localized_value: Some(name.to_string()),
                },
                current_value: Some(current),
                limit: Some(limit),
                unit: Some("Count".to_string()),
                quota_period: None,
                status: None,
            });
        self
    }

    pub fn failing_list(mut self, account: &str) -> Self {
        self.failing_lists.insert(account.to_string());
        self
    }

    pub fn failing_update(mut self, deployment: &str) -> Self {
        self.failing_updates.insert(deployment.to_string());
        self
    }

    /// The update of `deployment` takes `delay` before it is applied.
    pub fn slow_update(mut self, deployment: &str, delay: Duration) -> Self {
        self.slow_updates.insert(deployment.to_string(), delay);
        self
    }

    pub fn deployment(&self, account: &str, name: &str) -> Option<Deployment> {
        self.deployments
            .lock()
            .unwrap()
            .get(account)
            .and_then(|list| list.iter().find(|d| d.name == name).cloned())
    }

    pub fn submitted_updates(&self) -> Vec<(DeploymentIdentity, DeploymentUpdate)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceManager for MockResourceManager {
    async fn list_accounts(&self) -> Result<Vec<Account>, ManagementError> {
        Ok(self.accounts.clone())
    }

    async fn list_deployments(
        &self,
        account: &Account,
    ) -> Result<Vec<Deployment>, ManagementError> {
        if self.failing_lists.contains(&account.name) {
            return Err(ManagementError::Api {
                status: 500,
                message: format!("listing '{}' failed", account.name),
            });
        }
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .get(&account.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_deployment(
        &self,
        identity: &DeploymentIdentity,
    ) -> Result<Deployment, ManagementError> {
        self.deployment(&identity.account_name, &identity.deployment_name)
            .ok_or_else(|| {
                ManagementError::NotFound(format!(
                    "Failed to retrieve deployment '{}' in account '{}'",
                    identity.deployment_name, identity.account_name
                ))
            })
    }

    async fn create_or_update_deployment(
        &self,
        identity: &DeploymentIdentity,
        update: &DeploymentUpdate,
    ) -> Result<Deployment, ManagementError> {
        if self.failing_updates.contains(&identity.deployment_name) {
            return Err(ManagementError::Api {
                status: 400,
                message: "InsufficientQuota".to_string(),
            });
        }
        if let Some(delay) = self.slow_updates.get(&identity.deployment_name) {
            tokio::time::sleep(*delay).await;
        }
        self.updates
            .lock()
            .unwrap()
            .push((identity.clone(), update.clone()));

        let mut properties = update.properties.clone();
        properties.provisioning_state = Some("Succeeded".to_string());
        let updated = Deployment {
            id: Some(format!(
                "/subscriptions/sub-1/resourceGroups/{}/providers/Microsoft.CognitiveServices/accounts/{}/deployments/{}",
                identity.resource_group, identity.account_name, identity.deployment_name
            )),
            name: identity.deployment_name.clone(),
            sku: Some(update.sku.clone()),
            properties,
        };

        let mut deployments = self.deployments.lock().unwrap();
        let list = deployments.entry(identity.account_name.clone()).or_default();
        match list.iter_mut().find(|d| d.name == identity.deployment_name) {
            Some(existing) => *existing = updated.clone(),
            None => list.push(updated.clone()),
        }
        Ok(updated)
    }

    async fn list_usages(&self, location: &str) -> Result<Vec<QuotaUsage>, ManagementError> {
        Ok(self.usages.get(location).cloned().unwrap_or_default())
    }
}
