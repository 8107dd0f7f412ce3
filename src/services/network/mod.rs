//! Microsoft.Network

mod lb_resource;
mod network_interface_data_source;
mod network_interface_resource;

pub use lb_resource::LoadBalancerResource;
pub use network_interface_data_source::NetworkInterfaceDataSource;
pub use network_interface_resource::NetworkInterfaceResource;

use crate::arm::ids::SubnetId;
use crate::plugin::locks::{LockGuard, Locks};
use crate::plugin::resource::{DataSource, Resource};
use anyhow::{Context, Result};
use serde_json::{Map, Value};

pub const API_VERSION: &str = "2023-09-01";

/// Lock kinds shared with every resource that attaches to a subnet
pub const VIRTUAL_NETWORK_RESOURCE_NAME: &str = "azurerm_virtual_network";
pub const SUBNET_RESOURCE_NAME: &str = "azurerm_subnet";

pub fn resources() -> Vec<Box<dyn Resource>> {
    vec![Box::new(NetworkInterfaceResource), Box::new(LoadBalancerResource)]
}

pub fn data_sources() -> Vec<Box<dyn DataSource>> {
    vec![Box::new(NetworkInterfaceDataSource)]
}

/// Lock the virtual networks, then the subnets, behind `subnet_ids`
pub async fn lock_subnets(locks: &Locks, subnet_ids: &[String]) -> Result<Vec<LockGuard>> {
    let mut virtual_networks = Vec::with_capacity(subnet_ids.len());
    let mut subnets = Vec::with_capacity(subnet_ids.len());
    for raw in subnet_ids {
        let id = SubnetId::parse_insensitively(raw).with_context(|| format!("parsing subnet ID {:?}", raw))?;
        virtual_networks.push(id.virtual_network_lock_name().to_string());
        subnets.push(id.subnet_name);
    }

    let mut guards = locks.by_names(&virtual_networks, VIRTUAL_NETWORK_RESOURCE_NAME).await;
    guards.extend(locks.by_names(&subnets, SUBNET_RESOURCE_NAME).await);
    Ok(guards)
}

/// Overlay `updates` onto the `properties` of a fetched object, keeping
/// settings other resources manage (security groups, backend pools, ...)
pub(crate) fn merge_properties(existing: &mut Value, updates: Map<String, Value>) -> Result<()> {
    let object = existing
        .as_object_mut()
        .context("expected the API to return an object")?;
    let properties = object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    properties
        .as_object_mut()
        .context("expected `properties` to be an object")?
        .extend(updates);
    Ok(())
}

/// Strings of an array field, skipping anything else
pub(crate) fn string_list(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter(|v| v.is_string())
        .cloned()
        .collect()
}
