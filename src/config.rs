//! Configuration Management
//!
//! Provider settings, persisted at `<config_dir>/azrm/config.json` and
//! overridden by `ARM_*` environment variables and command-line flags.

use crate::arm::auth::{get_default_subscription, validate_subscription_id, TokenSource};
use crate::arm::environment::CloudEnvironment;
use crate::provider::Features;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Never written to disk
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Pre-acquired bearer token, only taken from the environment
    #[serde(skip)]
    pub access_token: Option<String>,
    /// `public`, `china` or `usgovernment`
    #[serde(default)]
    pub environment: Option<String>,
    /// Custom Resource Manager endpoint (takes precedence over `environment`)
    #[serde(default)]
    pub resource_manager_endpoint: Option<String>,
    #[serde(default)]
    pub authority_host: Option<String>,
    /// Authenticate through the Azure CLI when no service principal is configured
    #[serde(default)]
    pub use_cli: Option<bool>,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub disable_correlation_request_id: bool,
    /// Override for every long-running operation poll interval
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azrm").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {:?}", path))?;

        Ok(())
    }

    /// Apply `ARM_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true"));

        if let Some(v) = lookup("ARM_SUBSCRIPTION_ID") {
            self.subscription_id = Some(v);
        }
        if let Some(v) = lookup("ARM_TENANT_ID") {
            self.tenant_id = Some(v);
        }
        if let Some(v) = lookup("ARM_CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = lookup("ARM_CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = lookup("ARM_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = lookup("ARM_ENVIRONMENT") {
            self.environment = Some(v);
        }
        if let Some(v) = lookup("ARM_RESOURCE_MANAGER_ENDPOINT") {
            self.resource_manager_endpoint = Some(v);
        }
        if let Some(v) = lookup("ARM_AUTHORITY_HOST") {
            self.authority_host = Some(v);
        }
        if let Some(v) = flag("ARM_USE_CLI") {
            self.use_cli = Some(v);
        }
        if let Some(v) = flag("ARM_DISABLE_CORRELATION_REQUEST_ID") {
            self.disable_correlation_request_id = v;
        }
        if let Some(v) = lookup("ARM_POLL_INTERVAL").and_then(|v| v.parse().ok()) {
            self.poll_interval_secs = Some(v);
        }

        self
    }

    /// Get effective subscription (CLI/env/config > Azure CLI default)
    pub fn effective_subscription(&self) -> Result<String> {
        let subscription = self
            .subscription_id
            .clone()
            .or_else(get_default_subscription)
            .context("No subscription configured. Set ARM_SUBSCRIPTION_ID or run 'az login'")?;

        if !validate_subscription_id(&subscription) {
            anyhow::bail!("subscription ID {:?} is not a valid UUID", subscription);
        }
        Ok(subscription)
    }

    pub fn cloud_environment(&self) -> Result<CloudEnvironment> {
        if let Some(endpoint) = &self.resource_manager_endpoint {
            let authority = self
                .authority_host
                .clone()
                .unwrap_or_else(|| CloudEnvironment::public().authority_host);
            return Ok(CloudEnvironment::custom(endpoint, &authority));
        }
        CloudEnvironment::from_name(self.environment.as_deref().unwrap_or("public"))
    }

    /// Pick the token source: access token, then service principal, then Azure CLI
    pub fn token_source(&self) -> Result<TokenSource> {
        if let Some(token) = &self.access_token {
            return Ok(TokenSource::Static(token.clone()));
        }

        match (&self.tenant_id, &self.client_id, &self.client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                return Ok(TokenSource::ClientSecret {
                    tenant_id: tenant_id.clone(),
                    client_id: client_id.clone(),
                    client_secret: client_secret.clone(),
                });
            }
            (_, Some(_), Some(_)) => {
                anyhow::bail!("ARM_TENANT_ID is required to authenticate with a client secret")
            }
            _ => {}
        }

        if self.use_cli.unwrap_or(true) {
            Ok(TokenSource::AzureCli)
        } else {
            anyhow::bail!("No credentials configured and Azure CLI authentication is disabled")
        }
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_secs.map(Duration::from_secs)
    }

    /// Set subscription and save
    pub fn set_subscription(&mut self, subscription_id: &str) -> Result<()> {
        if !validate_subscription_id(subscription_id) {
            anyhow::bail!("subscription ID {:?} is not a valid UUID", subscription_id);
        }
        self.subscription_id = Some(subscription_id.to_string());
        self.save()
    }
}
