//! Provider
//!
//! Shared runtime state handed to every resource handler, the type registry
//! and the host-facing dispatcher.

pub mod dispatch;
pub mod registry;

use crate::arm::auth::AzureCredentials;
use crate::arm::client::ArmClient;
use crate::config::Config;
use crate::plugin::locks::Locks;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behaviour switches users can toggle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub resource_group: ResourceGroupFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupFeatures {
    /// Refuse to delete a resource group that still contains resources
    #[serde(default = "default_true")]
    pub prevent_deletion_if_contains_resources: bool,
}

impl Default for ResourceGroupFeatures {
    fn default() -> Self {
        Self {
            prevent_deletion_if_contains_resources: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Everything a handler needs besides its own state
#[derive(Clone)]
pub struct ProviderMeta {
    pub client: ArmClient,
    pub subscription_id: String,
    pub features: Features,
    pub locks: Locks,
    poll_interval_override: Option<Duration>,
}

impl ProviderMeta {
    pub fn new(client: ArmClient, features: Features) -> Self {
        Self {
            subscription_id: client.subscription_id().to_string(),
            client,
            features,
            locks: Locks::new(),
            poll_interval_override: None,
        }
    }

    /// Poll every long-running operation and status wait at `interval`
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.client = self.client.with_poll_interval(interval);
        self.poll_interval_override = Some(interval);
        self
    }

    /// Build an authenticated client from configuration
    pub fn configure(config: &Config) -> Result<Self> {
        let environment = config.cloud_environment()?;
        let subscription_id = config.effective_subscription()?;
        let source = config.token_source()?;
        tracing::info!(
            "Configuring provider: environment={}, subscription={}, auth={:?}",
            environment.name,
            subscription_id,
            source
        );

        let correlation_id = if config.disable_correlation_request_id {
            None
        } else {
            Some(uuid::Uuid::new_v4().to_string())
        };

        let credentials = AzureCredentials::new(source, environment.clone())?;
        let client = ArmClient::new(credentials, environment, &subscription_id, correlation_id)?;

        let meta = Self::new(client, config.features.clone());
        Ok(match config.poll_interval() {
            Some(interval) => meta.with_poll_interval(interval),
            None => meta,
        })
    }

    /// Interval for status waits: the configured override, else `default`
    pub fn poll_interval(&self, default: Duration) -> Duration {
        self.poll_interval_override.unwrap_or(default)
    }
}
