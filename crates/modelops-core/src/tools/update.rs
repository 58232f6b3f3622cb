//! Deployment update workflow and its batch driver.
//!
//! An update never fails as an `Err`: every path ends in an [`UpdateOutcome`]
//! so a batch can report each item independently and the model can react to
//! individual failures.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::Instant;

use crate::errors::FailureKind;
use crate::management::{
    Deployment, DeploymentIdentity, DeploymentModel, DeploymentProperties, DeploymentUpdate,
    ResourceManager, Sku,
};

/// SKU submitted when an update leaves both SKU fields unset.
pub const DEFAULT_SKU_NAME: &str = "GlobalStandard";
pub const DEPLOYMENT_MODEL_FORMAT: &str = "OpenAI";
const FOUNDRY_PORTAL_BASE: &str = "https://ai.azure.com/resource/deployments";

/// How strictly update requests are checked before anything is fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Model and SKU may change together; versions and capacities are passed through.
    #[default]
    Permissive,
    /// One kind of change per request, model updates need a version, capacity must be positive.
    Strict,
}

/// Sparse patch; absent or empty fields keep the existing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_sku_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_sku_capacity: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl UpdateFields {
    pub fn model_name(&self) -> Option<&str> {
        non_empty(&self.new_model_name)
    }

    pub fn model_version(&self) -> Option<&str> {
        non_empty(&self.new_model_version)
    }

    pub fn sku_name(&self) -> Option<&str> {
        non_empty(&self.new_sku_name)
    }

    pub fn updating_model(&self) -> bool {
        self.model_name().is_some()
    }

    pub fn updating_sku(&self) -> bool {
        self.sku_name().is_some() || self.new_sku_capacity.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(flatten)]
    pub identity: DeploymentIdentity,
    #[serde(flatten)]
    pub update: UpdateFields,
}

impl UpdateRequest {
    pub fn new(identity: DeploymentIdentity, update: UpdateFields) -> Self {
        Self { identity, update }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_info: Option<DeploymentIdentity>,
}

impl UpdateOutcome {
    pub fn succeeded(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
            message: message.into(),
            deployment_info: None,
        }
    }

    pub fn failed(kind: FailureKind, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            message: message.into(),
            deployment_info: None,
        }
    }

    fn tagged(mut self, identity: DeploymentIdentity) -> Self {
        self.deployment_info = Some(identity);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_requests: usize,
    pub successful_updates: usize,
    pub failed_updates: usize,
    pub success_rate: String,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[UpdateOutcome]) -> Self {
        let total = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.success).count();
        let rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };
        Self {
            total_requests: total,
            successful_updates: successful,
            failed_updates: total - successful,
            success_rate: format!("{:.1}%", rate),
        }
    }
}

/// Outcome list with the run-level summary alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<UpdateOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<BatchSummary>,
}

/// Builds AI Foundry portal links for updated deployments.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundryLinks {
    pub subscription_id: String,
    pub tenant_id: Option<String>,
    pub project: String,
}

impl FoundryLinks {
    pub fn deployment_url(&self, identity: &DeploymentIdentity, resource_id: &str) -> String {
        let wsid = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.CognitiveServices/accounts/{}/projects/{}",
            self.subscription_id, identity.resource_group, identity.account_name, self.project
        );
        format!(
            "{}/{}?wsid={}&tid={}",
            FOUNDRY_PORTAL_BASE,
            urlencoding::encode(resource_id),
            urlencoding::encode(&wsid),
            self.tenant_id.as_deref().unwrap_or_default()
        )
    }

    fn resource_id(&self, identity: &DeploymentIdentity) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.CognitiveServices/accounts/{}/deployments/{}",
            self.subscription_id,
            identity.resource_group,
            identity.account_name,
            identity.deployment_name
        )
    }
}

/// New model identity: the requested one, or the existing one untouched.
pub fn build_model(existing: &DeploymentModel, update: &UpdateFields) -> DeploymentModel {
    match update.model_name() {
        Some(name) => DeploymentModel {
            format: Some(DEPLOYMENT_MODEL_FORMAT.to_string()),
            name: name.to_string(),
            version: update.model_version().map(str::to_string),
        },
        None => existing.clone(),
    }
}

/// Copy every existing property, replacing only the model.
pub fn build_properties(
    existing: &DeploymentProperties,
    model: DeploymentModel,
) -> DeploymentProperties {
    DeploymentProperties {
        model,
        ..existing.clone()
    }
}

pub fn build_sku(existing: Option<&Sku>, update: &UpdateFields) -> Sku {
    let existing_capacity = existing.and_then(|s| s.capacity);
    if update.updating_sku() {
        Sku {
            name: update
                .sku_name()
                .map(str::to_string)
                .or_else(|| existing.map(|s| s.name.clone()))
                .unwrap_or_else(|| DEFAULT_SKU_NAME.to_string()),
            capacity: update.new_sku_capacity.or(existing_capacity),
        }
    } else {
        Sku {
            name: DEFAULT_SKU_NAME.to_string(),
            capacity: existing_capacity,
        }
    }
}

/// Checks that need no remote state. Returns the rejection reason.
pub fn validate_request(request: &UpdateRequest, policy: ValidationPolicy) -> Option<String> {
    if let Some(field) = request.identity.missing_field() {
        return Some(format!("Missing required field: {}", field));
    }

    let fields = &request.update;
    let updating_model = fields.updating_model();
    let updating_sku = fields.updating_sku();

    if !updating_model && !updating_sku {
        return Some("Must specify either a model update or a SKU update".to_string());
    }

    if policy == ValidationPolicy::Strict {
        if updating_model && updating_sku {
            return Some("Cannot update model and SKU simultaneously".to_string());
        }
        if updating_model && fields.model_version().is_none() {
            return Some("Missing model version for model update".to_string());
        }
        if fields.new_sku_capacity.is_some_and(|c| c <= 0) {
            return Some("SKU capacity must be a positive integer".to_string());
        }
    }

    None
}

pub struct DeploymentUpdater {
    manager: Arc<dyn ResourceManager>,
    policy: ValidationPolicy,
    links: Option<FoundryLinks>,
}

impl DeploymentUpdater {
    pub fn new(manager: Arc<dyn ResourceManager>) -> Self {
        Self {
            manager,
            policy: ValidationPolicy::default(),
            links: None,
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_links(mut self, links: FoundryLinks) -> Self {
        self.links = Some(links);
        self
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    pub async fn update(&self, request: &UpdateRequest) -> UpdateOutcome {
        if let Some(reason) = validate_request(request, self.policy) {
            log::warn!("Rejected deployment update: {}", reason);
            return UpdateOutcome::failed(
                FailureKind::Validation,
                reason,
                "Invalid deployment update request",
            );
        }

        let identity = &request.identity;
        let existing = match self.manager.get_deployment(identity).await {
            Ok(deployment) => deployment,
            Err(e) => {
                return UpdateOutcome::failed(
                    FailureKind::from_management(&e),
                    e.to_string(),
                    format!(
                        "Could not read existing deployment '{}'",
                        identity.deployment_name
                    ),
                );
            }
        };

        let model = build_model(&existing.properties.model, &request.update);
        let payload = DeploymentUpdate {
            sku: build_sku(existing.sku.as_ref(), &request.update),
            properties: build_properties(&existing.properties, model),
        };
        log::debug!(
            "Submitting update for '{}': model={} sku={}",
            identity.deployment_name,
            payload.properties.model.name,
            payload.sku.name
        );

        match self
            .manager
            .create_or_update_deployment(identity, &payload)
            .await
        {
            Ok(updated) => {
                log::info!("Successfully updated deployment '{}'", identity.deployment_name);
                UpdateOutcome::succeeded(
                    self.success_data(identity, &updated),
                    format!(
                        "Successfully updated deployment '{}'",
                        identity.deployment_name
                    ),
                )
            }
            Err(e) => {
                log::error!("Error updating deployment: {}", e);
                UpdateOutcome::failed(
                    FailureKind::from_management(&e),
                    e.to_string(),
                    format!("Failed to update deployment '{}'", identity.deployment_name),
                )
            }
        }
    }

    fn success_data(&self, identity: &DeploymentIdentity, updated: &Deployment) -> Value {
        let deployment = serde_json::to_value(updated).unwrap_or(Value::Null);
        match &self.links {
            Some(links) => {
                let resource_id = updated
                    .id
                    .clone()
                    .unwrap_or_else(|| links.resource_id(identity));
                json!({
                    "deployment": deployment,
                    "url": links.deployment_url(identity, &resource_id),
                })
            }
            None => json!({ "deployment": deployment }),
        }
    }

    /// Run updates one at a time in input order; a failure never stops the batch.
    pub async fn batch_update(&self, requests: Vec<UpdateRequest>) -> BatchReport {
        self.run_batch(requests.into_iter().map(Ok).collect(), None).await
    }

    /// Batch entry point for raw tool arguments. Items that do not parse
    /// become validation failures in place.
    pub async fn batch_update_values(&self, items: Vec<Value>) -> BatchReport {
        self.batch_update_values_until(items, None).await
    }

    /// Items not started by `deadline` are reported as skipped; an update in
    /// flight when it passes still completes.
    pub async fn batch_update_values_until(
        &self,
        items: Vec<Value>,
        deadline: Option<Instant>,
    ) -> BatchReport {
        let parsed = items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<UpdateRequest>(item.clone()).map_err(|e| {
                    let identity =
                        serde_json::from_value::<DeploymentIdentity>(item).unwrap_or_default();
                    (identity, format!("Malformed update request: {}", e))
                })
            })
            .collect();
        self.run_batch(parsed, deadline).await
    }

    async fn run_batch(
        &self,
        items: Vec<Result<UpdateRequest, (DeploymentIdentity, String)>>,
        deadline: Option<Instant>,
    ) -> BatchReport {
        if items.is_empty() {
            return BatchReport {
                results: vec![UpdateOutcome::failed(
                    FailureKind::Validation,
                    "No deployment updates were provided",
                    "Nothing to update",
                )],
                summary: None,
            };
        }

        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let expired = deadline.is_some_and(|at| Instant::now() >= at);
            let outcome = match item {
                Ok(request) if expired => skipped(&request.identity).tagged(request.identity),
                Ok(request) => {
                    let outcome = self.update(&request).await;
                    outcome.tagged(request.identity)
                }
                Err((identity, reason)) => UpdateOutcome::failed(
                    FailureKind::Validation,
                    reason,
                    "Invalid deployment update request",
                )
                .tagged(identity),
            };
            log::info!(
                "Batch item {} ({}): {}",
                index + 1,
                outcome
                    .deployment_info
                    .as_ref()
                    .map(|i| i.deployment_name.as_str())
                    .unwrap_or_default(),
                if outcome.success { "succeeded" } else { "failed" }
            );
            results.push(outcome);
        }

        let summary = BatchSummary::from_outcomes(&results);
        log::info!(
            "Batch finished: {}/{} succeeded ({})",
            summary.successful_updates,
            summary.total_requests,
            summary.success_rate
        );
        BatchReport {
            results,
            summary: Some(summary),
        }
    }
}

fn skipped(identity: &DeploymentIdentity) -> UpdateOutcome {
    UpdateOutcome::failed(
        FailureKind::Collaborator,
        "Conversation time budget exhausted before this update started",
        format!("Skipped update of deployment '{}'", identity.deployment_name),
    )
}
