//! Deployment enumeration across every account in scope.

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::management::{Account, Deployment, ManagementError, ResourceManager};

/// Optional narrowing predicates. Filters combine with AND; an absent or
/// empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFilters {
    #[serde(default)]
    pub model_filter: Option<Vec<String>>,
    #[serde(default)]
    pub sku_filter: Option<Vec<String>>,
    #[serde(default)]
    pub location_filter: Option<Vec<String>>,
    #[serde(default)]
    pub account_filter: Option<Vec<String>>,
    #[serde(default)]
    pub resource_group_filter: Option<Vec<String>>,
}

fn passes(filter: &Option<Vec<String>>, value: Option<&str>) -> bool {
    match filter {
        Some(allowed) if !allowed.is_empty() => {
            value.is_some_and(|v| allowed.iter().any(|a| a == v))
        }
        _ => true,
    }
}

impl DeploymentFilters {
    fn accepts_account(&self, account: &Account) -> bool {
        passes(&self.account_filter, Some(&account.name))
            && passes(&self.resource_group_filter, Some(&account.resource_group))
    }

    fn accepts(&self, summary: &DeploymentSummary) -> bool {
        passes(&self.model_filter, Some(&summary.model))
            && passes(&self.sku_filter, summary.sku.as_deref())
            && passes(&self.location_filter, Some(&summary.location))
    }
}

/// Flattened view of one deployment as reported to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub account_name: String,
    pub resource_group: String,
    pub location: String,
    pub deployment_name: String,
    pub model: String,
    pub version: Option<String>,
    pub sku: Option<String>,
    pub capacity: Option<i64>,
}

impl DeploymentSummary {
    pub fn new(account: &Account, deployment: &Deployment) -> Self {
        Self {
            account_name: account.name.clone(),
            resource_group: account.resource_group.clone(),
            location: account.location.clone(),
            deployment_name: deployment.name.clone(),
            model: deployment.properties.model.name.clone(),
            version: deployment.properties.model.version.clone(),
            sku: deployment.sku.as_ref().map(|s| s.name.clone()),
            capacity: deployment.sku.as_ref().and_then(|s| s.capacity),
        }
    }
}

/// Apply the model/SKU/location predicates to an already fetched list.
pub fn apply_deployment_filters(
    deployments: Vec<DeploymentSummary>,
    filters: &DeploymentFilters,
) -> Vec<DeploymentSummary> {
    deployments
        .into_iter()
        .filter(|d| filters.accepts(d))
        .collect()
}

pub struct DeploymentReader {
    manager: Arc<dyn ResourceManager>,
}

impl DeploymentReader {
    pub fn new(manager: Arc<dyn ResourceManager>) -> Self {
        Self { manager }
    }

    /// Fetch every in-scope account's deployments concurrently. Results keep
    /// account enumeration order.
    pub async fn list(
        &self,
        filters: &DeploymentFilters,
    ) -> Result<Vec<DeploymentSummary>, ManagementError> {
        let accounts: Vec<Account> = self
            .manager
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| filters.accepts_account(a))
            .collect();
        log::debug!("Listing deployments for {} accounts", accounts.len());

        let per_account = try_join_all(accounts.iter().map(|account| async move {
            let deployments = self.manager.list_deployments(account).await?;
            Ok::<_, ManagementError>(
                deployments
                    .iter()
                    .map(|d| DeploymentSummary::new(account, d))
                    .collect::<Vec<_>>(),
            )
        }))
        .await?;

        let merged: Vec<DeploymentSummary> = per_account.into_iter().flatten().collect();
        let total = merged.len();
        let filtered = apply_deployment_filters(merged, filters);
        log::info!("Found {} deployments ({} after filtering)", total, filtered.len());
        Ok(filtered)
    }
}
