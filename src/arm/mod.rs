//! Azure Resource Manager API interaction module
//!
//! This module provides the core functionality for talking to the Azure
//! Resource Manager: authentication, the HTTP client, long-running operation
//! polling and resource identifiers.
//!
//! # Module Structure
//!
//! - [`environment`] - Cloud endpoints (public, China, US Government, custom)
//! - [`auth`] - Token sources and the token cache
//! - [`http`] - HTTP utilities and ARM error parsing
//! - [`poller`] - Long-running operation polling
//! - [`client`] - Main ARM client for making API requests
//! - [`ids`] - Typed resource identifiers
//!
//! # Example
//!
//! ```ignore
//! use crate::arm::client::ArmClient;
//!
//! async fn example(client: &ArmClient) -> anyhow::Result<()> {
//!     let id = client.subscription_path("resourceGroups/example");
//!     let group = client.get(&id, "2022-09-01").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod environment;
pub mod http;
pub mod ids;
pub mod poller;
