use super::network_interface_resource::set_properties;
use super::API_VERSION;
use crate::arm::ids::NetworkInterfaceId;
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::ResourceData;
use crate::plugin::resource::{DataSource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub struct NetworkInterfaceDataSource;

fn ip_configuration_schema() -> Schema {
    let computed_string = || Attribute::computed(AttrType::String);
    Schema::new()
        .with("name", computed_string())
        .with("subnet_id", computed_string())
        .with("private_ip_address_version", computed_string())
        .with("private_ip_address_allocation", computed_string())
        .with("private_ip_address", computed_string())
        .with("public_ip_address_id", computed_string())
        .with("primary", Attribute::computed(AttrType::Bool))
}

#[async_trait]
impl DataSource for NetworkInterfaceDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_network_interface"
    }

    fn schema(&self) -> Schema {
        let strings = || Attribute::computed(AttrType::list(AttrType::String));
        Schema::new()
            .with("name", Attribute::required(AttrType::String))
            .with("resource_group_name", commonschema::resource_group_name_for_data_source())
            .with("location", commonschema::location_computed())
            .with("ip_configuration", Attribute::computed(AttrType::blocks(ip_configuration_schema())))
            .with("dns_servers", strings())
            .with("applied_dns_servers", strings())
            .with("enable_accelerated_networking", Attribute::computed(AttrType::Bool))
            .with("enable_ip_forwarding", Attribute::computed(AttrType::Bool))
            .with("internal_dns_name_label", Attribute::computed(AttrType::String))
            .with("internal_domain_name_suffix", Attribute::computed(AttrType::String))
            .with("mac_address", Attribute::computed(AttrType::String))
            .with("private_ip_address", Attribute::computed(AttrType::String))
            .with("private_ip_addresses", strings())
            .with("virtual_machine_id", Attribute::computed(AttrType::String))
            .with("tags", tags::schema_computed())
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = NetworkInterfaceId::new(
            &meta.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("name"),
        );

        let nic = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
            .with_context(|| format!("{} was not found", id))?;

        d.set_id(id.id());
        d.set("location", location::normalize_nilable(nic.get("location")));
        set_properties(d, nic.get("properties").unwrap_or(&Value::Null));
        d.set("tags", tags::flatten(nic.get("tags")));
        Ok(())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5, 5)
    }
}
