//! Azure Resource Manager implementation of [`ResourceManager`].
//!
//! Accounts are enumerated through a Resource Graph query; deployments and
//! quota usages go through the Cognitive Services management endpoints.
//! Create-or-update is a long-running operation: the PUT returns immediately
//! and the deployment is polled until its provisioning state is terminal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    Account, Deployment, DeploymentIdentity, DeploymentUpdate, ManagementError, QuotaUsage,
    ResourceManager,
};
use crate::config::ManagementConfig;
use crate::errors::AgentError;

pub const DEFAULT_ARM_API_BASE: &str = "https://management.azure.com";
pub const DEFAULT_COGNITIVE_API_VERSION: &str = "2023-05-01";
pub const DEFAULT_ACCOUNT_KIND: &str = "AIServices";
const RESOURCE_GRAPH_API_VERSION: &str = "2021-03-01";

#[derive(Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct GraphPage {
    #[serde(default)]
    data: Vec<Account>,
    #[serde(rename = "$skipToken", default)]
    skip_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArmClient {
    client: Client,
    api_base: String,
    subscription_id: String,
    access_token: String,
    api_version: String,
    account_kind: String,
    resource_group_scope: Option<String>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl ArmClient {
    pub fn new(subscription_id: String, access_token: String) -> Self {
        Self {
            client: Client::new(),
            api_base: DEFAULT_ARM_API_BASE.to_string(),
            subscription_id,
            access_token,
            api_version: DEFAULT_COGNITIVE_API_VERSION.to_string(),
            account_kind: DEFAULT_ACCOUNT_KIND.to_string(),
            resource_group_scope: None,
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 45,
        }
    }

    pub fn from_config(config: &ManagementConfig) -> Result<Self, AgentError> {
        let access_token = config.auth.access_token.clone().ok_or_else(|| {
            AgentError::ConfigError(
                "No access token found for resource management. Set access_token or access_token_env"
                    .to_string(),
            )
        })?;

        let mut client = Self::new(config.subscription_id.clone(), access_token)
            .with_api_base(config.api_base.clone())
            .with_api_version(config.api_version.clone())
            .with_account_kind(config.account_kind.clone())
            .with_polling(
                Duration::from_millis(config.poll_interval_ms),
                config.max_poll_attempts,
            );
        if let Some(scope) = &config.resource_group_scope {
            client = client.with_resource_group_scope(scope.clone());
        }
        Ok(client)
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, api_version: String) -> Self {
        self.api_version = api_version;
        self
    }

    pub fn with_account_kind(mut self, account_kind: String) -> Self {
        self.account_kind = account_kind;
        self
    }

    pub fn with_resource_group_scope(mut self, resource_group: String) -> Self {
        self.resource_group_scope = Some(resource_group);
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_poll_attempts = max_attempts;
        self
    }

    fn account_query(&self) -> String {
        let mut query = format!(
            "Resources\n| where type == 'microsoft.cognitiveservices/accounts'\n| where kind =~ '{}'\n",
            self.account_kind.replace('\'', "")
        );
        if let Some(scope) = &self.resource_group_scope {
            query.push_str(&format!(
                "| where resourceGroup == '{}'\n",
                scope.replace('\'', "")
            ));
        }
        query.push_str("| project id, name, subscriptionId, resourceGroup, location");
        query
    }

    fn deployments_url(&self, resource_group: &str, account_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.CognitiveServices/accounts/{}/deployments",
            self.api_base,
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(resource_group),
            urlencoding::encode(account_name)
        )
    }

    fn deployment_url(&self, identity: &DeploymentIdentity) -> String {
        format!(
            "{}/{}",
            self.deployments_url(&identity.resource_group, &identity.account_name),
            urlencoding::encode(&identity.deployment_name)
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, ManagementError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ManagementError::Decode(format!("{}: {}", context, e)));
        }

        let message = format!("{}: {}", context, arm_error_message(&body, status.as_u16()));
        log::warn!("{}", message);
        Err(match status.as_u16() {
            404 => ManagementError::NotFound(message),
            401 | 403 => ManagementError::Auth(message),
            code => ManagementError::Api {
                status: code,
                message,
            },
        })
    }

    async fn list_paged<T: DeserializeOwned>(
        &self,
        first_url: String,
        context: &str,
    ) -> Result<Vec<T>, ManagementError> {
        let mut items = Vec::new();
        let mut page: Page<T> = self
            .send(
                self.client
                    .get(&first_url)
                    .query(&[("api-version", self.api_version.as_str())]),
                context,
            )
            .await?;

        loop {
            items.append(&mut page.value);
            match page.next_link.take() {
                Some(next) if !next.is_empty() => {
                    page = self.send(self.client.get(&next), context).await?;
                }
                _ => break,
            }
        }
        Ok(items)
    }
}

/// Pull the message out of an ARM error envelope, falling back to the raw body.
fn arm_error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {}", status))
}

#[async_trait]
impl ResourceManager for ArmClient {
    async fn list_accounts(&self) -> Result<Vec<Account>, ManagementError> {
        let url = format!("{}/providers/Microsoft.ResourceGraph/resources", self.api_base);
        let query = self.account_query();
        let mut accounts = Vec::new();
        let mut skip_token: Option<String> = None;

        loop {
            let mut options = json!({"resultFormat": "objectArray"});
            if let Some(token) = &skip_token {
                options["$skipToken"] = json!(token);
            }
            let body = json!({
                "subscriptions": [self.subscription_id],
                "query": query,
                "options": options,
            });

            let mut page: GraphPage = self
                .send(
                    self.client
                        .post(&url)
                        .query(&[("api-version", RESOURCE_GRAPH_API_VERSION)])
                        .json(&body),
                    "Failed to enumerate accounts",
                )
                .await?;
            accounts.append(&mut page.data);

            match page.skip_token {
                Some(token) if !token.is_empty() => skip_token = Some(token),
                _ => break,
            }
        }

        log::debug!("Resource Graph returned {} accounts", accounts.len());
        Ok(accounts)
    }

    async fn list_deployments(
        &self,
        account: &Account,
    ) -> Result<Vec<Deployment>, ManagementError> {
        let context = format!("Failed to list deployments for account '{}'", account.name);
        self.list_paged(
            self.deployments_url(&account.resource_group, &account.name),
            &context,
        )
        .await
    }

    async fn get_deployment(
        &self,
        identity: &DeploymentIdentity,
    ) -> Result<Deployment, ManagementError> {
        let context = format!(
            "Failed to retrieve deployment '{}' in account '{}'",
            identity.deployment_name, identity.account_name
        );
        self.send(
            self.client
                .get(self.deployment_url(identity))
                .query(&[("api-version", self.api_version.as_str())]),
            &context,
        )
        .await
    }

    async fn create_or_update_deployment(
        &self,
        identity: &DeploymentIdentity,
        update: &DeploymentUpdate,
    ) -> Result<Deployment, ManagementError> {
        log::info!(
            "Starting deployment update for '{}' in account '{}'",
            identity.deployment_name,
            identity.account_name
        );
        let context = format!(
            "Failed to update deployment '{}' in account '{}'",
            identity.deployment_name, identity.account_name
        );

        let mut deployment: Deployment = self
            .send(
                self.client
                    .put(self.deployment_url(identity))
                    .query(&[("api-version", self.api_version.as_str())])
                    .json(update),
                &context,
            )
            .await?;

        let mut attempts = 0;
        loop {
            match deployment.properties.provisioning_state.as_deref() {
                None | Some("Succeeded") => return Ok(deployment),
                Some(state @ ("Failed" | "Canceled")) => {
                    return Err(ManagementError::ProvisioningFailed {
                        deployment: identity.deployment_name.clone(),
                        state: state.to_string(),
                    });
                }
                Some(state) => {
                    if attempts >= self.max_poll_attempts {
                        return Err(ManagementError::ProvisioningFailed {
                            deployment: identity.deployment_name.clone(),
                            state: format!("{} (gave up after {} polls)", state, attempts),
                        });
                    }
                    log::debug!(
                        "Deployment '{}' is {}, polling again in {:?}",
                        identity.deployment_name,
                        state,
                        self.poll_interval
                    );
                    tokio::time::sleep(self.poll_interval).await;
                    attempts += 1;
                    deployment = self.get_deployment(identity).await?;
                }
            }
        }
    }

    async fn list_usages(&self, location: &str) -> Result<Vec<QuotaUsage>, ManagementError> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.CognitiveServices/locations/{}/usages",
            self.api_base,
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(location)
        );
        let context = format!("Failed to read quota usage for location '{}'", location);
        self.list_paged(url, &context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::management::{DeploymentModel, DeploymentProperties, Sku};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct ArmState {
        base: Arc<Mutex<String>>,
        graph_bodies: Arc<Mutex<Vec<Value>>>,
        put_bodies: Arc<Mutex<Vec<Value>>>,
        gets: Arc<Mutex<u32>>,
    }

    fn deployment_json(name: &str, state: &str) -> Value {
        json!({
            "id": format!("/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.CognitiveServices/accounts/acct/deployments/{}", name),
            "name": name,
            "sku": {"name": "Standard", "capacity": 20},
            "properties": {
                "model": {"format": "OpenAI", "name": "gpt-4o", "version": "2024-05-13"},
                "provisioningState": state
            }
        })
    }

    async fn graph(State(state): State<ArmState>, Json(body): Json<Value>) -> Json<Value> {
        state.graph_bodies.lock().unwrap().push(body);
        Json(json!({
            "data": [{"id": "acct-id", "name": "acct", "subscriptionId": "sub-1", "resourceGroup": "rg", "location": "eastus"}]
        }))
    }

    async fn list(
        State(state): State<ArmState>,
        Path((_sub, _rg, account)): Path<(String, String, String)>,
    ) -> Json<Value> {
        let base = state.base.lock().unwrap().clone();
        Json(json!({
            "value": [deployment_json(&format!("{}-first", account), "Succeeded")],
            "nextLink": format!("{}/page2", base)
        }))
    }

    async fn page2() -> Json<Value> {
        Json(json!({"value": [deployment_json("acct-second", "Succeeded")]}))
    }

    async fn get_one(
        State(state): State<ArmState>,
        Path((_sub, _rg, _account, name)): Path<(String, String, String, String)>,
    ) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
        if name == "missing" {
            return Err((
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": "DeploymentNotFound", "message": "Deployment missing not found"}})),
            ));
        }
        *state.gets.lock().unwrap() += 1;
        Ok(Json(deployment_json(&name, "Succeeded")))
    }

    async fn put_one(
        State(state): State<ArmState>,
        Path((_sub, _rg, _account, name)): Path<(String, String, String, String)>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        state.put_bodies.lock().unwrap().push(body);
        let state = if name == "doomed" { "Failed" } else { "Updating" };
        Json(deployment_json(&name, state))
    }

    async fn usages() -> Json<Value> {
        Json(json!({"value": [{
            "name": {"value": "OpenAI.Standard.gpt-4o", "localizedValue": "Tokens Per Minute (thousands) - GPT-4o"},
            "currentValue": 30.0, "limit": 450.0, "unit": "Count"
        }]}))
    }

    async fn start_arm_mock() -> (ArmClient, ArmState) {
        let state = ArmState::default();
        let app = Router::new()
            .route("/providers/Microsoft.ResourceGraph/resources", post(graph))
            .route(
                "/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.CognitiveServices/accounts/{account}/deployments",
                get(list),
            )
            .route(
                "/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.CognitiveServices/accounts/{account}/deployments/{name}",
                get(get_one).put(put_one),
            )
            .route(
                "/subscriptions/{sub}/providers/Microsoft.CognitiveServices/locations/{location}/usages",
                get(usages),
            )
            .route("/page2", get(page2))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        *state.base.lock().unwrap() = base.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = ArmClient::new("sub-1".to_string(), "token".to_string())
            .with_api_base(base)
            .with_resource_group_scope("rg".to_string())
            .with_polling(Duration::from_millis(1), 5);
        (client, state)
    }

    fn update_body() -> DeploymentUpdate {
        DeploymentUpdate {
            sku: Sku {
                name: "Standard".to_string(),
                capacity: Some(40),
            },
            properties: DeploymentProperties {
                model: DeploymentModel {
                    format: Some("OpenAI".to_string()),
                    name: "gpt-4o".to_string(),
                    version: Some("2024-05-13".to_string()),
                },
                provisioning_state: None,
                capabilities: None,
                rai_policy_name: None,
                rate_limits: None,
                version_upgrade_option: None,
                current_capacity: None,
            },
        }
    }

    #[test]
    fn test_account_query_scoping() {
        let client = ArmClient::new("s".to_string(), "t".to_string());
        assert!(client.account_query().contains("kind =~ 'AIServices'"));
        assert!(!client.account_query().contains("resourceGroup =="));

        let scoped = client.with_resource_group_scope("team-rg".to_string());
        assert!(scoped.account_query().contains("resourceGroup == 'team-rg'"));
    }

    #[test]
    fn test_arm_error_message_extraction() {
        let body = r#"{"error": {"code": "X", "message": "quota exceeded"}}"#;
        assert_eq!(arm_error_message(body, 400), "quota exceeded");
        assert_eq!(arm_error_message("", 502), "HTTP 502");
    }

    #[tokio::test]
    async fn test_list_accounts_and_paged_deployments() {
        let (client, state) = start_arm_mock().await;

        let accounts = client.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].resource_group, "rg");
        let graph_body = state.graph_bodies.lock().unwrap()[0].clone();
        assert_eq!(graph_body["subscriptions"][0], "sub-1");
        assert_eq!(graph_body["options"]["resultFormat"], "objectArray");

        let deployments = client.list_deployments(&accounts[0]).await.unwrap();
        let names: Vec<_> = deployments.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["acct-first", "acct-second"]);
    }

    #[tokio::test]
    async fn test_get_missing_deployment_is_not_found() {
        let (client, _) = start_arm_mock().await;
        let err = client
            .get_deployment(&DeploymentIdentity::new("rg", "acct", "missing"))
            .await
            .unwrap_err();
        match err {
            ManagementError::NotFound(msg) => {
                assert!(msg.contains("Failed to retrieve deployment 'missing' in account 'acct'"));
                assert!(msg.contains("Deployment missing not found"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_polls_until_succeeded() {
        let (client, state) = start_arm_mock().await;
        let identity = DeploymentIdentity::new("rg", "acct", "chat");

        let deployment = client
            .create_or_update_deployment(&identity, &update_body())
            .await
            .unwrap();
        assert_eq!(
            deployment.properties.provisioning_state.as_deref(),
            Some("Succeeded")
        );
        assert_eq!(*state.gets.lock().unwrap(), 1);

        let put = state.put_bodies.lock().unwrap()[0].clone();
        assert_eq!(put["sku"]["capacity"], 40);
        assert_eq!(put["properties"]["model"]["name"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_update_failed_provisioning() {
        let (client, _) = start_arm_mock().await;
        let identity = DeploymentIdentity::new("rg", "acct", "doomed");
        let err = client
            .create_or_update_deployment(&identity, &update_body())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManagementError::ProvisioningFailed { ref state, .. } if state == "Failed"
        ));
    }

    #[tokio::test]
    async fn test_list_usages() {
        let (client, _) = start_arm_mock().await;
        let usages = client.list_usages("eastus").await.unwrap();
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].limit, Some(450.0));
        assert_eq!(usages[0].name.value.as_deref(), Some("OpenAI.Standard.gpt-4o"));
    }
}
