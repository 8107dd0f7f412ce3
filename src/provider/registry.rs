//! Type Registry
//!
//! Maps configuration type names to resource and data source implementations.
//! Built once on first access from the service modules.

use crate::plugin::resource::{DataSource, Resource};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// All registered types, keyed by type name
#[derive(Default)]
pub struct Registry {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
}

/// Global registry
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the registry (built from the service modules on first access)
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut registry = Registry::default();

        for resource in crate::services::resources() {
            registry.resources.insert(resource.type_name(), resource);
        }
        for data_source in crate::services::data_sources() {
            registry.data_sources.insert(data_source.type_name(), data_source);
        }

        tracing::debug!(
            "Registered {} resources and {} data sources",
            registry.resources.len(),
            registry.data_sources.len()
        );
        registry
    })
}

/// Get a resource implementation by type name
pub fn get_resource(type_name: &str) -> Option<&'static dyn Resource> {
    get_registry().resources.get(type_name).map(|r| r.as_ref())
}

/// Get a data source implementation by type name
pub fn get_data_source(type_name: &str) -> Option<&'static dyn DataSource> {
    get_registry().data_sources.get(type_name).map(|d| d.as_ref())
}

/// All resource type names, sorted
pub fn resource_types() -> Vec<&'static str> {
    get_registry().resources.keys().copied().collect()
}

/// All data source type names, sorted
pub fn data_source_types() -> Vec<&'static str> {
    get_registry().data_sources.keys().copied().collect()
}

/// Schemas of every type: `{"resources": {...}, "data_sources": {...}}`
pub fn provider_schema() -> Value {
    let registry = get_registry();

    let resources: Map<String, Value> = registry
        .resources
        .iter()
        .map(|(name, r)| (name.to_string(), schema_json(&r.schema())))
        .collect();
    let data_sources: Map<String, Value> = registry
        .data_sources
        .iter()
        .map(|(name, d)| (name.to_string(), schema_json(&d.schema())))
        .collect();

    serde_json::json!({
        "resources": resources,
        "data_sources": data_sources,
    })
}

fn schema_json(schema: &crate::plugin::schema::Schema) -> Value {
    serde_json::to_value(schema).unwrap_or(Value::Null)
}
