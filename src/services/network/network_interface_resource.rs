use super::{lock_subnets, merge_properties, string_list, API_VERSION};
use crate::arm::client::was_not_found;
use crate::arm::ids::{NetworkInterfaceId, PublicIpAddressId, SubnetId};
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::{bool_field, opt_str_field, str_field, ResourceData};
use crate::plugin::resource::{import_as_exists_error, Resource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const NETWORK_INTERFACE_RESOURCE_NAME: &str = "azurerm_network_interface";

pub struct NetworkInterfaceResource;

fn ip_configuration_schema() -> Schema {
    Schema::new()
        .with("name", Attribute::required(AttrType::String))
        .with("subnet_id", Attribute::optional(AttrType::String))
        .with(
            "private_ip_address_version",
            Attribute::optional(AttrType::String).default_value("IPv4"),
        )
        .with("private_ip_address_allocation", Attribute::required(AttrType::String))
        .with("private_ip_address", Attribute::optional_computed(AttrType::String))
        .with("public_ip_address_id", Attribute::optional(AttrType::String))
        .with("primary", Attribute::optional_computed(AttrType::Bool))
}

#[async_trait]
impl Resource for NetworkInterfaceResource {
    fn type_name(&self) -> &'static str {
        NETWORK_INTERFACE_RESOURCE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with("name", commonschema::name())
            .with("location", commonschema::location())
            .with("resource_group_name", commonschema::resource_group_name())
            .with(
                "ip_configuration",
                Attribute::required(AttrType::blocks(ip_configuration_schema())).min_items(1),
            )
            .with("dns_servers", Attribute::optional(AttrType::list(AttrType::String)))
            .with(
                "enable_accelerated_networking",
                Attribute::optional(AttrType::Bool).default_value(false),
            )
            .with("enable_ip_forwarding", Attribute::optional(AttrType::Bool).default_value(false))
            .with("internal_dns_name_label", Attribute::optional_computed(AttrType::String))
            .with("applied_dns_servers", Attribute::computed(AttrType::list(AttrType::String)))
            .with("internal_domain_name_suffix", Attribute::computed(AttrType::String))
            .with("mac_address", Attribute::computed(AttrType::String))
            .with("private_ip_address", Attribute::computed(AttrType::String))
            .with("private_ip_addresses", Attribute::computed(AttrType::list(AttrType::String)))
            .with("virtual_machine_id", Attribute::computed(AttrType::String))
            .with("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        NetworkInterfaceId::parse(id)?;
        Ok(())
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = NetworkInterfaceId::new(
            &meta.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("name"),
        );

        let existing = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {}", id))?;
        if existing.is_some() {
            return Err(import_as_exists_error(self.type_name(), &id.id()));
        }

        let body = json!({
            "location": d.get_str("location"),
            "properties": expand_properties(d)?,
            "tags": tags::expand(&d.get_map("tags"))?,
        });

        let _nic = meta
            .locks
            .by_name(&id.network_interface_name, NETWORK_INTERFACE_RESOURCE_NAME)
            .await;
        let _subnets = lock_subnets(&meta.locks, &subnet_ids(d.get_list("ip_configuration"))).await?;

        meta.client
            .put_then_poll(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("creating {}", id))?;

        d.set_id(id.id());
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = NetworkInterfaceId::parse(d.id())?;

        let Some(nic) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        d.set("name", id.network_interface_name.as_str());
        d.set("resource_group_name", id.resource_group_name.as_str());
        d.set("location", location::normalize_nilable(nic.get("location")));
        set_properties(d, nic.get("properties").unwrap_or(&Value::Null));
        d.set("tags", tags::flatten(nic.get("tags")));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = NetworkInterfaceId::parse(d.id())?;

        let _nic = meta
            .locks
            .by_name(&id.network_interface_name, NETWORK_INTERFACE_RESOURCE_NAME)
            .await;
        let _subnets = lock_subnets(&meta.locks, &subnet_ids(d.get_list("ip_configuration"))).await?;

        let mut existing = meta
            .client
            .get(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?;

        let updates = match expand_properties(d)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merge_properties(&mut existing, updates).with_context(|| format!("updating {}", id))?;
        if d.has_change("tags") {
            existing["tags"] = tags::expand(&d.get_map("tags"))?;
        }

        meta.client
            .put_then_poll(&id.id(), API_VERSION, &existing)
            .await
            .with_context(|| format!("updating {}", id))?;

        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = NetworkInterfaceId::parse(d.id())?;

        let _nic = meta
            .locks
            .by_name(&id.network_interface_name, NETWORK_INTERFACE_RESOURCE_NAME)
            .await;

        let Some(existing) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            return Ok(());
        };

        let attached: Vec<String> = existing
            .pointer("/properties/ipConfigurations")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|c| c.pointer("/properties/subnet/id").and_then(|v| v.as_str()))
            .map(String::from)
            .collect();
        let _subnets = lock_subnets(&meta.locks, &attached).await?;

        match meta.client.delete_then_poll(&id.id(), API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if was_not_found(&e) => Ok(()),
            Err(e) => Err(e.context(format!("deleting {}", id))),
        }
    }
}

fn expand_properties(d: &ResourceData) -> Result<Value> {
    let mut dns_settings = json!({ "dnsServers": d.get_string_list("dns_servers") });
    if let Some(label) = d.get_ok("internal_dns_name_label") {
        dns_settings["internalDnsNameLabel"] = label.clone();
    }

    Ok(json!({
        "enableAcceleratedNetworking": d.get_bool("enable_accelerated_networking"),
        "enableIPForwarding": d.get_bool("enable_ip_forwarding"),
        "ipConfigurations": expand_ip_configurations(d.get_list("ip_configuration"))?,
        "dnsSettings": dns_settings,
    }))
}

fn subnet_ids(ip_configurations: &[Value]) -> Vec<String> {
    ip_configurations
        .iter()
        .filter_map(|c| opt_str_field(c, "subnet_id"))
        .map(String::from)
        .collect()
}

/// Build `ipConfigurations`; without an explicit primary the first one is primary
fn expand_ip_configurations(input: &[Value]) -> Result<Vec<Value>> {
    let explicit_primaries = input.iter().filter(|c| bool_field(c, "primary")).count();
    if explicit_primaries > 1 {
        anyhow::bail!("only one `ip_configuration` can be marked as `primary`");
    }

    let mut output = Vec::with_capacity(input.len());
    for (index, config) in input.iter().enumerate() {
        let name = str_field(config, "name");
        let allocation = str_field(config, "private_ip_address_allocation");
        let version = opt_str_field(config, "private_ip_address_version").unwrap_or("IPv4");
        let primary = if explicit_primaries == 0 {
            index == 0
        } else {
            bool_field(config, "primary")
        };

        let mut properties = json!({
            "privateIPAllocationMethod": allocation,
            "privateIPAddressVersion": version,
            "primary": primary,
        });

        if allocation.eq_ignore_ascii_case("Static") {
            let address = opt_str_field(config, "private_ip_address").with_context(|| {
                format!(
                    "ip_configuration {:?}: `private_ip_address` is required when `private_ip_address_allocation` is Static",
                    name
                )
            })?;
            properties["privateIPAddress"] = json!(address);
        }

        match opt_str_field(config, "subnet_id") {
            Some(subnet_id) => {
                SubnetId::parse(subnet_id)
                    .with_context(|| format!("ip_configuration {:?}: subnet_id", name))?;
                properties["subnet"] = json!({ "id": subnet_id });
            }
            None if version.eq_ignore_ascii_case("IPv4") => anyhow::bail!(
                "ip_configuration {:?}: a `subnet_id` must be specified for an IPv4 network interface",
                name
            ),
            None => {}
        }

        if let Some(public_ip) = opt_str_field(config, "public_ip_address_id") {
            PublicIpAddressId::parse(public_ip)
                .with_context(|| format!("ip_configuration {:?}: public_ip_address_id", name))?;
            properties["publicIPAddress"] = json!({ "id": public_ip });
        }

        output.push(json!({ "name": name, "properties": properties }));
    }

    Ok(output)
}

fn flatten_ip_configurations(input: Option<&Value>) -> Vec<Value> {
    input
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .map(|config| {
            let props = config.get("properties").unwrap_or(&Value::Null);
            let text = |pointer: &str| {
                props
                    .pointer(pointer)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let version = Some(text("/privateIPAddressVersion"))
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "IPv4".to_string());

            json!({
                "name": config.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
                "subnet_id": text("/subnet/id"),
                "private_ip_address_version": version,
                "private_ip_address_allocation": text("/privateIPAllocationMethod"),
                "private_ip_address": text("/privateIPAddress"),
                "public_ip_address_id": text("/publicIPAddress/id"),
                "primary": props.get("primary").and_then(|v| v.as_bool()).unwrap_or(false),
            })
        })
        .collect()
}

/// Address of the primary configuration, else of the first one
fn primary_private_ip(configs: &[Value]) -> String {
    configs
        .iter()
        .find(|c| bool_field(c, "primary"))
        .or_else(|| configs.first())
        .map(|c| str_field(c, "private_ip_address").to_string())
        .unwrap_or_default()
}

/// Copy everything below `properties` into state (shared with the data source)
pub(super) fn set_properties(d: &mut ResourceData, props: &Value) {
    let configs = flatten_ip_configurations(props.get("ipConfigurations"));
    let addresses: Vec<Value> = configs
        .iter()
        .filter_map(|c| opt_str_field(c, "private_ip_address"))
        .map(|a| json!(a))
        .collect();

    let dns = props.get("dnsSettings").unwrap_or(&Value::Null);
    d.set("applied_dns_servers", string_list(dns.get("appliedDnsServers")));
    d.set("dns_servers", string_list(dns.get("dnsServers")));
    d.set(
        "internal_dns_name_label",
        dns.get("internalDnsNameLabel").cloned().unwrap_or(Value::Null),
    );
    d.set(
        "internal_domain_name_suffix",
        dns.get("internalDomainNameSuffix").cloned().unwrap_or(Value::Null),
    );

    d.set(
        "enable_accelerated_networking",
        props.get("enableAcceleratedNetworking").and_then(|v| v.as_bool()).unwrap_or(false),
    );
    d.set(
        "enable_ip_forwarding",
        props.get("enableIPForwarding").and_then(|v| v.as_bool()).unwrap_or(false),
    );
    d.set("mac_address", props.get("macAddress").cloned().unwrap_or(Value::Null));
    d.set(
        "virtual_machine_id",
        props.pointer("/virtualMachine/id").cloned().unwrap_or(Value::Null),
    );
    d.set("private_ip_address", primary_private_ip(&configs));
    d.set("private_ip_addresses", addresses);
    d.set("ip_configuration", configs);
}
