//! Azure Resource Manager provider plugin
//!
//! Declarative resources and data sources mapped onto the ARM REST API.

pub mod arm;
pub mod config;
pub mod helpers;
pub mod plugin;
pub mod provider;
pub mod services;

/// Version injected at compile time via AZRM_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZRM_VERSION") {
    Some(v) => v,
    None => "dev",
};
