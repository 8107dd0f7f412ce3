//! Azure Authentication
//!
//! Handles authentication using a static access token, a service principal
//! with a client secret, or Azure CLI credentials.

use super::environment::CloudEnvironment;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Where access tokens come from
#[derive(Clone)]
pub enum TokenSource {
    /// Pre-acquired bearer token (ARM_ACCESS_TOKEN)
    Static(String),
    /// Service principal authenticating with a client secret
    ClientSecret {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Whatever account the Azure CLI is logged in with
    AzureCli,
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => write!(f, "Static(<redacted>)"),
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                ..
            } => write!(f, "ClientSecret(tenant={}, client={})", tenant_id, client_id),
            TokenSource::AzureCli => write!(f, "AzureCli"),
        }
    }
}

/// Azure credentials holder with token caching
#[derive(Clone)]
pub struct AzureCredentials {
    source: TokenSource,
    environment: CloudEnvironment,
    http: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token endpoint response (OAuth2 client credentials grant)
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Output of `az account get-access-token`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

impl AzureCredentials {
    pub fn new(source: TokenSource, environment: CloudEnvironment) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("azrm/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client for authentication")?;

        Ok(Self {
            source,
            environment,
            http,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Describe the credential source (never includes secrets)
    pub fn source(&self) -> &TokenSource {
        &self.source
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (token, ttl) = match &self.source {
            TokenSource::Static(token) => (token.clone(), DEFAULT_TOKEN_TTL),
            TokenSource::ClientSecret {
                tenant_id,
                client_id,
                client_secret,
            } => self.client_secret_token(tenant_id, client_id, client_secret).await?,
            TokenSource::AzureCli => self.azure_cli_token().await?,
        };

        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }

    async fn client_secret_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(String, Duration)> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.environment.authority_host, tenant_id
        );
        let scope = self.environment.token_scope();
        tracing::debug!("POST {} (client credentials, client_id={})", url, client_id);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach the Azure AD token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            // Security: the body may echo request parameters, do not log it
            return Err(anyhow::anyhow!(
                "Service principal authentication failed: {}",
                status
            ));
        }

        let token: OAuthTokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        let ttl = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        Ok((token.access_token, ttl))
    }

    async fn azure_cli_token(&self) -> Result<(String, Duration)> {
        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                self.environment.resource_manager_audience.as_str(),
                "--output",
                "json",
            ])
            .output()
            .await
            .context("Failed to run the Azure CLI. Is `az` installed and on PATH?")?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "Azure CLI authentication failed. Run 'az login'"
            ));
        }

        let token: CliTokenResponse = serde_json::from_slice(&output.stdout)
            .context("Failed to parse `az account get-access-token` output")?;

        let ttl = cli_token_ttl(&token).unwrap_or(DEFAULT_TOKEN_TTL);
        Ok((token.access_token, ttl))
    }
}

/// Remaining lifetime of a CLI token, preferring the epoch field newer CLIs emit
fn cli_token_ttl(token: &CliTokenResponse) -> Option<Duration> {
    let expires_at = if let Some(epoch) = token.expires_on_epoch {
        Utc.timestamp_opt(epoch, 0).single()?
    } else {
        // Older CLIs: local time, "2024-01-15 10:30:00.000000"
        let raw = token.expires_on.as_deref()?;
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
        Local
            .from_local_datetime(&naive)
            .single()?
            .with_timezone(&Utc)
    };

    (expires_at - Utc::now()).to_std().ok()
}

/// Get the Azure CLI configuration directory
pub fn get_azure_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("AZURE_CONFIG_DIR") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|p| p.join(".azure"))
}

/// Validate a subscription ID: must be a UUID
pub fn validate_subscription_id(subscription: &str) -> bool {
    uuid::Uuid::parse_str(subscription).is_ok()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureProfile {
    #[serde(default)]
    subscriptions: Vec<ProfileSubscription>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSubscription {
    id: String,
    #[serde(default)]
    is_default: bool,
}

/// Read the default subscription from the Azure CLI profile
/// Security: Validates the subscription ID format before returning
pub fn get_default_subscription() -> Option<String> {
    let path = get_azure_config_dir()?.join("azureProfile.json");
    let content = std::fs::read_to_string(&path).ok()?;
    default_subscription_from_profile(&content)
}

fn default_subscription_from_profile(content: &str) -> Option<String> {
    // The CLI writes this file with a UTF-8 BOM
    let content = content.trim_start_matches('\u{feff}');
    let profile: AzureProfile = match serde_json::from_str(content) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Failed to parse azureProfile.json: {}", e);
            return None;
        }
    };

    let subscription = profile.subscriptions.into_iter().find(|s| s.is_default)?;
    if validate_subscription_id(&subscription.id) {
        Some(subscription.id)
    } else {
        tracing::warn!("Invalid subscription ID format in azureProfile.json");
        None
    }
}
