//! ARM Client
//!
//! Main client for interacting with the Azure Resource Manager, combining
//! authentication, HTTP functionality and long-running operation polling.

use super::auth::AzureCredentials;
use super::environment::CloudEnvironment;
use super::http::{api_error, ArmHttpClient, ArmResponse};
use super::poller::{self, PollStrategy};
use anyhow::{Context, Result};
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// Default interval between polls of a long-running operation
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    pub credentials: AzureCredentials,
    pub http: ArmHttpClient,
    pub environment: CloudEnvironment,
    subscription_id: String,
    poll_interval: Duration,
}

impl ArmClient {
    /// Create a new ARM client
    pub fn new(
        credentials: AzureCredentials,
        environment: CloudEnvironment,
        subscription_id: &str,
        correlation_id: Option<String>,
    ) -> Result<Self> {
        let http = ArmHttpClient::new(correlation_id)?;

        Ok(Self {
            credentials,
            http,
            environment,
            subscription_id: subscription_id.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the default long-running operation poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.get_token().await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build the URL of a resource (or a path below it) for an API version
    pub fn resource_url(&self, id: &str, api_version: &str) -> String {
        self.url_with_query(id, &[("api-version", api_version)])
    }

    /// Build a URL below the Resource Manager endpoint with encoded query parameters
    pub fn url_with_query(&self, path: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let base = format!(
            "{}/{}",
            self.environment.resource_manager_endpoint,
            path.trim_start_matches('/')
        );
        if query.is_empty() {
            base
        } else {
            format!("{}?{}", base, query)
        }
    }

    /// Build a subscription-scoped path, e.g. `providers/Microsoft.Network`
    pub fn subscription_path(&self, path: &str) -> String {
        format!(
            "/subscriptions/{}/{}",
            self.subscription_id,
            path.trim_start_matches('/')
        )
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Send a request to an absolute URL (operation status, `nextLink` pages)
    pub async fn send_url(&self, method: Method, url: &str) -> Result<ArmResponse> {
        let url = self.checked_url(url)?;
        let token = self.get_token().await?;
        self.http.send(method, url.as_str(), &token, None).await
    }

    /// Reject follow-up URLs pointing away from the configured endpoint host
    fn checked_url(&self, raw: &str) -> Result<url::Url> {
        let url = url::Url::parse(raw).with_context(|| format!("invalid URL returned by the API: {}", raw))?;
        let endpoint = url::Url::parse(&self.environment.resource_manager_endpoint)
            .context("invalid resource manager endpoint")?;
        if url.host_str() != endpoint.host_str() {
            tracing::warn!(
                "Following URL on host {:?} (endpoint host {:?})",
                url.host_str(),
                endpoint.host_str()
            );
        }
        Ok(url)
    }

    /// GET a resource
    pub async fn get(&self, id: &str, api_version: &str) -> Result<Value> {
        let token = self.get_token().await?;
        self.http.get(&self.resource_url(id, api_version), &token).await
    }

    /// GET a resource, `None` when it does not exist
    pub async fn get_if_exists(&self, id: &str, api_version: &str) -> Result<Option<Value>> {
        match self.get(id, api_version).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if was_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// PUT a resource without waiting for provisioning to finish
    pub async fn put(&self, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        let token = self.get_token().await?;
        let response = self
            .http
            .put(&self.resource_url(id, api_version), &token, body)
            .await?;
        Ok(response.body)
    }

    /// PUT a resource and wait until the operation completes; returns the final resource
    pub async fn put_then_poll(&self, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        let url = self.resource_url(id, api_version);
        let token = self.get_token().await?;
        let response = self.http.put(&url, &token, body).await?;
        self.complete(id, api_version, &url, response, true).await
    }

    /// PATCH a resource without waiting
    pub async fn patch(&self, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        let token = self.get_token().await?;
        let response = self
            .http
            .patch(&self.resource_url(id, api_version), &token, body)
            .await?;
        Ok(response.body)
    }

    /// PATCH a resource and wait until the operation completes; returns the final resource
    pub async fn patch_then_poll(&self, id: &str, api_version: &str, body: &Value) -> Result<Value> {
        let url = self.resource_url(id, api_version);
        let token = self.get_token().await?;
        let response = self.http.patch(&url, &token, body).await?;
        self.complete(id, api_version, &url, response, true).await
    }

    /// POST an action (e.g. `{id}/listKeys`)
    pub async fn post(&self, path: &str, api_version: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        let response = self
            .http
            .post(&self.resource_url(path, api_version), &token, body)
            .await?;
        Ok(response.body)
    }

    /// POST an action and wait for it; returns the operation's final body
    pub async fn post_then_poll(
        &self,
        path: &str,
        api_version: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.resource_url(path, api_version);
        let token = self.get_token().await?;
        let response = self.http.post(&url, &token, body).await?;
        self.complete(path, api_version, &url, response, false).await
    }

    /// DELETE a resource without waiting
    pub async fn delete(&self, id: &str, api_version: &str) -> Result<()> {
        let token = self.get_token().await?;
        self.http
            .delete(&self.resource_url(id, api_version), &token)
            .await?;
        Ok(())
    }

    /// DELETE a resource and wait until the operation completes
    pub async fn delete_then_poll(&self, id: &str, api_version: &str) -> Result<()> {
        let url = self.resource_url(id, api_version);
        let token = self.get_token().await?;
        let response = self.http.delete(&url, &token).await?;
        self.complete(id, api_version, &url, response, false).await?;
        Ok(())
    }

    /// Drive the operation started by `response` to completion
    ///
    /// With `refetch` the resource is read again once the operation succeeds,
    /// since status documents do not carry the resource body.
    async fn complete(
        &self,
        id: &str,
        api_version: &str,
        url: &str,
        response: ArmResponse,
        refetch: bool,
    ) -> Result<Value> {
        let resource_url = refetch.then_some(url);
        let Some(strategy) = PollStrategy::from_response(&response, resource_url) else {
            return Ok(response.body);
        };

        tracing::debug!("Waiting for long-running operation on {} ({:?})", id, strategy);
        let initial = poller::retry_after(&response);
        let final_body = poller::wait_for_completion(self, &strategy, initial).await?;

        match strategy {
            PollStrategy::Location(_) if !refetch || !final_body.is_null() => Ok(final_body),
            _ if refetch => self.get(id, api_version).await,
            _ => Ok(final_body),
        }
    }
}

/// Whether an error (anywhere in its chain) is an HTTP 404 from the API
pub fn was_not_found(error: &anyhow::Error) -> bool {
    api_error(error).is_some_and(|e| e.is_not_found())
}
