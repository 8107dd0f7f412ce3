//! Service Modules
//!
//! One module per Azure service. Each contributes its resources and data
//! sources to the registry and nothing else; resources never call each other.

pub mod logic;
pub mod mssql;
pub mod network;
pub mod redis;
pub mod resource;

use crate::plugin::resource::{DataSource, Resource};

/// Every resource the provider manages
pub fn resources() -> Vec<Box<dyn Resource>> {
    let mut all: Vec<Box<dyn Resource>> = Vec::new();
    all.extend(resource::resources());
    all.extend(network::resources());
    all.extend(redis::resources());
    all.extend(logic::resources());
    all.extend(mssql::resources());
    all
}

/// Every data source the provider offers
pub fn data_sources() -> Vec<Box<dyn DataSource>> {
    let mut all: Vec<Box<dyn DataSource>> = Vec::new();
    all.extend(resource::data_sources());
    all.extend(network::data_sources());
    all
}
