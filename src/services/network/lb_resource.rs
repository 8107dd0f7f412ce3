use super::{lock_subnets, merge_properties, API_VERSION};
use crate::arm::client::was_not_found;
use crate::arm::ids::{FrontendIpConfigurationId, LoadBalancerId, PublicIpAddressId, SubnetId};
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::{opt_str_field, str_field, ResourceData};
use crate::plugin::resource::{import_as_exists_error, Resource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Lock kind used by everything that modifies a load balancer
pub const LOAD_BALANCER_RESOURCE_NAME: &str = "azurerm_lb";

pub struct LoadBalancerResource;

fn frontend_ip_configuration_schema() -> Schema {
    Schema::new()
        .with("name", Attribute::required(AttrType::String))
        .with("subnet_id", Attribute::optional_computed(AttrType::String))
        .with("private_ip_address", Attribute::optional_computed(AttrType::String))
        .with("private_ip_address_allocation", Attribute::optional_computed(AttrType::String))
        .with("private_ip_address_version", Attribute::optional_computed(AttrType::String))
        .with("public_ip_address_id", Attribute::optional_computed(AttrType::String))
        .with("zones", commonschema::zones_optional_force_new())
        .with("id", Attribute::computed(AttrType::String))
        .with("inbound_nat_rules", Attribute::computed(AttrType::set(AttrType::String)))
        .with("load_balancer_rules", Attribute::computed(AttrType::set(AttrType::String)))
        .with("outbound_rules", Attribute::computed(AttrType::set(AttrType::String)))
}

#[async_trait]
impl Resource for LoadBalancerResource {
    fn type_name(&self) -> &'static str {
        LOAD_BALANCER_RESOURCE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with("name", commonschema::name())
            .with("location", commonschema::location())
            .with("resource_group_name", commonschema::resource_group_name())
            .with(
                "frontend_ip_configuration",
                Attribute::optional(AttrType::blocks(frontend_ip_configuration_schema())),
            )
            .with("sku", Attribute::optional(AttrType::String).default_value("Basic").force_new())
            .with(
                "sku_tier",
                Attribute::optional(AttrType::String).default_value("Regional").force_new(),
            )
            .with("private_ip_address", Attribute::computed(AttrType::String))
            .with("private_ip_addresses", Attribute::computed(AttrType::list(AttrType::String)))
            .with("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        LoadBalancerId::parse(id)?;
        Ok(())
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = LoadBalancerId::new(
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

        let frontends = d.get_list("frontend_ip_configuration");
        let body = json!({
            "location": d.get_str("location"),
            "sku": {
                "name": d.get_str("sku"),
                "tier": d.get_str("sku_tier"),
            },
            "properties": {
                "frontendIPConfigurations": expand_frontend_ip_configurations(frontends)?,
            },
            "tags": tags::expand(&d.get_map("tags"))?,
        });

        let _subnets = lock_subnets(&meta.locks, &frontend_subnet_ids(frontends)).await?;

        meta.client
            .put_then_poll(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("creating {}", id))?;

        d.set_id(id.id());
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = LoadBalancerId::parse(d.id())?;

        let Some(lb) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        d.set("name", id.load_balancer_name.as_str());
        d.set("resource_group_name", id.resource_group_name.as_str());
        d.set("location", location::normalize_nilable(lb.get("location")));
        d.set("sku", lb.pointer("/sku/name").cloned().unwrap_or(Value::Null));
        d.set("sku_tier", lb.pointer("/sku/tier").cloned().unwrap_or(Value::Null));

        let frontends = flatten_frontend_ip_configurations(&id, lb.pointer("/properties/frontendIPConfigurations"));
        let addresses: Vec<Value> = frontends
            .iter()
            .filter_map(|f| opt_str_field(f, "private_ip_address"))
            .map(|a| json!(a))
            .collect();
        d.set(
            "private_ip_address",
            addresses.first().cloned().unwrap_or(Value::String(String::new())),
        );
        d.set("private_ip_addresses", addresses);
        d.set("frontend_ip_configuration", frontends);
        d.set("tags", tags::flatten(lb.get("tags")));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = LoadBalancerId::parse(d.id())?;

        let _lb = meta.locks.by_name(&id.load_balancer_name, LOAD_BALANCER_RESOURCE_NAME).await;

        let mut existing = meta
            .client
            .get(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?;

        let frontends = d.get_list("frontend_ip_configuration");
        let _subnets = lock_subnets(&meta.locks, &frontend_subnet_ids(frontends)).await?;

        if d.has_change("frontend_ip_configuration") {
            let mut updates = Map::new();
            updates.insert(
                "frontendIPConfigurations".to_string(),
                Value::Array(expand_frontend_ip_configurations(frontends)?),
            );
            merge_properties(&mut existing, updates).with_context(|| format!("updating {}", id))?;
        }
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
        let id = LoadBalancerId::parse(d.id())?;

        let _lb = meta.locks.by_name(&id.load_balancer_name, LOAD_BALANCER_RESOURCE_NAME).await;

        match meta.client.delete_then_poll(&id.id(), API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if was_not_found(&e) => Ok(()),
            Err(e) => Err(e.context(format!("deleting {}", id))),
        }
    }
}

fn frontend_subnet_ids(frontends: &[Value]) -> Vec<String> {
    frontends
        .iter()
        .filter_map(|f| opt_str_field(f, "subnet_id"))
        .map(String::from)
        .collect()
}

fn expand_frontend_ip_configurations(input: &[Value]) -> Result<Vec<Value>> {
    let mut output = Vec::with_capacity(input.len());

    for frontend in input {
        let name = str_field(frontend, "name");
        let mut properties = Map::new();

        let public_ip = opt_str_field(frontend, "public_ip_address_id");
        let subnet = opt_str_field(frontend, "subnet_id");
        if public_ip.is_some() && subnet.is_some() {
            anyhow::bail!(
                "frontend_ip_configuration {:?}: only one of `public_ip_address_id` and `subnet_id` can be set",
                name
            );
        }

        if let Some(public_ip) = public_ip {
            PublicIpAddressId::parse(public_ip)
                .with_context(|| format!("frontend_ip_configuration {:?}: public_ip_address_id", name))?;
            properties.insert("publicIPAddress".to_string(), json!({ "id": public_ip }));
        }

        if let Some(subnet) = subnet {
            SubnetId::parse(subnet)
                .with_context(|| format!("frontend_ip_configuration {:?}: subnet_id", name))?;
            properties.insert("subnet".to_string(), json!({ "id": subnet }));

            let address = opt_str_field(frontend, "private_ip_address");
            let allocation = opt_str_field(frontend, "private_ip_address_allocation")
                .unwrap_or(if address.is_some() { "Static" } else { "Dynamic" });
            properties.insert("privateIPAllocationMethod".to_string(), json!(allocation));
            if let Some(address) = address {
                properties.insert("privateIPAddress".to_string(), json!(address));
            }
            if let Some(version) = opt_str_field(frontend, "private_ip_address_version") {
                properties.insert("privateIPAddressVersion".to_string(), json!(version));
            }
        }

        let mut config = json!({ "name": name, "properties": properties });
        let zones = frontend.get("zones").and_then(|v| v.as_array()).filter(|z| !z.is_empty());
        if let Some(zones) = zones {
            config["zones"] = Value::Array(zones.clone());
        }
        output.push(config);
    }

    Ok(output)
}

fn flatten_frontend_ip_configurations(lb: &LoadBalancerId, input: Option<&Value>) -> Vec<Value> {
    let ids_of = |props: &Value, key: &str| -> Vec<Value> {
        props
            .get(key)
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|r| r.get("id").cloned())
            .collect()
    };

    input
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .map(|config| {
            let name = config.get("name").and_then(|v| v.as_str()).unwrap_or_default();
            let props = config.get("properties").unwrap_or(&Value::Null);
            let text = |pointer: &str| props.pointer(pointer).and_then(|v| v.as_str()).unwrap_or_default();

            let id = config
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| {
                    FrontendIpConfigurationId::new(
                        &lb.subscription_id,
                        &lb.resource_group_name,
                        &lb.load_balancer_name,
                        name,
                    )
                    .id()
                });

            json!({
                "id": id,
                "name": name,
                "subnet_id": text("/subnet/id"),
                "private_ip_address": text("/privateIPAddress"),
                "private_ip_address_allocation": text("/privateIPAllocationMethod"),
                "private_ip_address_version": text("/privateIPAddressVersion"),
                "public_ip_address_id": text("/publicIPAddress/id"),
                "zones": config.get("zones").cloned().unwrap_or_else(|| json!([])),
                "inbound_nat_rules": ids_of(props, "inboundNatRules"),
                "load_balancer_rules": ids_of(props, "loadBalancingRules"),
                "outbound_rules": ids_of(props, "outboundRules"),
            })
        })
        .collect()
}
