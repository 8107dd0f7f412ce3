use super::configuration::{
    expand_patch_schedule, expand_redis_configuration, flatten_patch_schedule,
    flatten_redis_configuration, patch_schedule_schema, redis_configuration_schema, SKU_BASIC,
    SKU_PREMIUM,
};
use super::API_VERSION;
use crate::arm::client::{was_not_found, ArmClient};
use crate::arm::ids::{RedisId, SubnetId};
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::{ResourceData, ResourceState};
use crate::plugin::resource::{import_as_exists_error, Resource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::plugin::wait::{Refreshed, StateChangeConf};
use crate::provider::ProviderMeta;
use crate::services::network::lock_subnets;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(15);
const PENDING_STATES: [&str; 3] = ["Scaling", "Updating", "Creating"];

pub struct RedisCacheResource;

#[async_trait]
impl Resource for RedisCacheResource {
    fn type_name(&self) -> &'static str {
        "azurerm_redis_cache"
    }

    fn schema(&self) -> Schema {
        let computed_secret = || Attribute::computed(AttrType::String).sensitive();

        Schema::new()
            .with_version(1)
            .with("name", commonschema::name())
            .with("location", commonschema::location())
            .with("resource_group_name", commonschema::resource_group_name())
            .with("zones", commonschema::zones_optional_force_new())
            .with("capacity", Attribute::required(AttrType::Int))
            .with("family", Attribute::required(AttrType::String))
            .with("sku_name", Attribute::required(AttrType::String))
            .with(
                "minimum_tls_version",
                Attribute::optional(AttrType::String).default_value("1.2"),
            )
            .with("shard_count", Attribute::optional(AttrType::Int))
            .with("enable_non_ssl_port", Attribute::optional(AttrType::Bool).default_value(false))
            .with("subnet_id", Attribute::optional(AttrType::String).force_new())
            .with(
                "private_static_ip_address",
                Attribute::optional_computed(AttrType::String).force_new(),
            )
            .with(
                "redis_configuration",
                Attribute::optional_computed(AttrType::blocks(redis_configuration_schema())).max_items(1),
            )
            .with("patch_schedule", Attribute::optional(AttrType::blocks(patch_schedule_schema())))
            .with(
                "public_network_access_enabled",
                Attribute::optional(AttrType::Bool).default_value(true),
            )
            .with("replicas_per_master", Attribute::optional_computed(AttrType::Int))
            .with("replicas_per_primary", Attribute::optional_computed(AttrType::Int))
            .with("tenant_settings", Attribute::optional(AttrType::map(AttrType::String)))
            .with("redis_version", Attribute::optional_computed(AttrType::String))
            .with("hostname", Attribute::computed(AttrType::String))
            .with("port", Attribute::computed(AttrType::Int))
            .with("ssl_port", Attribute::computed(AttrType::Int))
            .with("primary_access_key", computed_secret())
            .with("secondary_access_key", computed_secret())
            .with("primary_connection_string", computed_secret())
            .with("secondary_connection_string", computed_secret())
            .with("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(90, 5, 90, 90)
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        RedisId::parse(id)?;
        Ok(())
    }

    /// Moving to a lower sku tier needs a new cache
    fn force_new_if_change(&self, config: &Value, prior: &ResourceState) -> Vec<String> {
        let new = config.get("sku_name").and_then(|v| v.as_str()).unwrap_or_default();
        let old = prior
            .attributes
            .get("sku_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if is_sku_downgrade(old, new) {
            vec!["sku_name".to_string()]
        } else {
            Vec::new()
        }
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = RedisId::new(
            &meta.subscription_id,
            d.get_str("resource_group_name"),
            d.get_str("name"),
        );
        tracing::info!("Preparing arguments for {} creation", id);

        let existing = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {}", id))?;
        if existing.is_some() {
            return Err(import_as_exists_error(self.type_name(), &id.id()));
        }

        let sku_name = d.get_str("sku_name");
        let subnet_id = d.get_ok("subnet_id").and_then(|v| v.as_str()).map(String::from);
        let redis_configuration = expand_redis_configuration(
            d.get_list("redis_configuration").first(),
            sku_name,
            subnet_id.is_some(),
        )
        .with_context(|| format!("parsing Redis Configuration for {}", id))?;

        let mut properties = json!({
            "enableNonSslPort": d.get_bool("enable_non_ssl_port"),
            "sku": {
                "capacity": d.get_i64("capacity"),
                "family": d.get_str("family"),
                "name": sku_name,
            },
            "minimumTlsVersion": d.get_str("minimum_tls_version"),
            "redisConfiguration": redis_configuration,
            "publicNetworkAccess": public_network_access(d.get_bool("public_network_access_enabled")),
        });
        for (attribute, key) in [
            ("shard_count", "shardCount"),
            ("replicas_per_master", "replicasPerMaster"),
            ("replicas_per_primary", "replicasPerPrimary"),
            ("redis_version", "redisVersion"),
            ("private_static_ip_address", "staticIP"),
        ] {
            if let Some(v) = d.get_ok(attribute) {
                properties[key] = v.clone();
            }
        }
        let tenant_settings = d.get_map("tenant_settings");
        if !tenant_settings.is_empty() {
            properties["tenantSettings"] = Value::Object(tenant_settings);
        }
        if let Some(subnet_id) = &subnet_id {
            SubnetId::parse(subnet_id).with_context(|| format!("parsing `subnet_id` of {}", id))?;
            properties["subnetId"] = json!(subnet_id);
        }

        let mut body = json!({
            "location": d.get_str("location"),
            "properties": properties,
            "tags": tags::expand(&d.get_map("tags"))?,
        });
        let zones = d.get_string_list("zones");
        if !zones.is_empty() {
            body["zones"] = json!(zones);
        }

        let _subnets = lock_subnets(&meta.locks, subnet_id.as_slice()).await?;

        meta.client
            .put_then_poll(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("creating {}", id))?;

        tracing::debug!("Waiting for {} to become available", id);
        wait_for_provisioning(meta, &id, &PENDING_STATES, d.time_remaining()).await?;

        d.set_id(id.id());

        if let Some(schedule) = expand_patch_schedule(d.get_list("patch_schedule")) {
            meta.client
                .put(&patch_schedule_id(&id), API_VERSION, &schedule)
                .await
                .with_context(|| format!("setting Patch Schedule for {}", id))?;
        }

        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = RedisId::parse(d.id())?;

        let Some(cache) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        let keys_path = format!("{}/listKeys", id.id());
        let schedule_id = patch_schedule_id(&id);
        let (keys, schedule) = futures::join!(
            meta.client.post(&keys_path, API_VERSION, None),
            meta.client.get(&schedule_id, API_VERSION),
        );
        let keys = keys.with_context(|| format!("listing access keys for {}", id))?;

        let schedule = match schedule {
            Ok(schedule) => flatten_patch_schedule(&schedule),
            Err(e) => {
                tracing::debug!("No patch schedule for {}: {:#}", id, e);
                Vec::new()
            }
        };
        d.set("patch_schedule", schedule);

        d.set("name", id.redis_name.as_str());
        d.set("resource_group_name", id.resource_group_name.as_str());
        d.set("location", location::normalize_nilable(cache.get("location")));
        d.set("zones", cache.get("zones").cloned().unwrap_or_else(|| json!([])));

        let props = cache.get("properties").unwrap_or(&Value::Null);
        let number = |key: &str| props.get(key).and_then(|v| v.as_i64());
        let text = |key: &str| props.get(key).and_then(|v| v.as_str()).unwrap_or_default();

        d.set("capacity", props.pointer("/sku/capacity").cloned().unwrap_or(Value::Null));
        d.set("family", props.pointer("/sku/family").cloned().unwrap_or(Value::Null));
        d.set("sku_name", props.pointer("/sku/name").cloned().unwrap_or(Value::Null));
        d.set("ssl_port", number("sslPort"));
        d.set("port", number("port"));
        d.set("hostname", text("hostName"));
        d.set("minimum_tls_version", text("minimumTlsVersion"));
        if let Some(shards) = number("shardCount") {
            d.set("shard_count", shards);
        }
        let non_ssl_port = props
            .get("enableNonSslPort")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        d.set("enable_non_ssl_port", non_ssl_port);
        d.set("private_static_ip_address", text("staticIP"));

        let subnet_id = match props.get("subnetId").and_then(|v| v.as_str()) {
            Some(raw) => SubnetId::parse_insensitively(raw)
                .with_context(|| format!("parsing subnet ID of {}", id))?
                .id(),
            None => String::new(),
        };
        d.set("subnet_id", subnet_id);

        d.set(
            "public_network_access_enabled",
            text("publicNetworkAccess").eq_ignore_ascii_case("Enabled"),
        );
        d.set("replicas_per_master", number("replicasPerMaster"));
        d.set("replicas_per_primary", number("replicasPerPrimary"));
        d.set("redis_version", major_version(text("redisVersion")));
        d.set(
            "tenant_settings",
            props.get("tenantSettings").cloned().unwrap_or_else(|| json!({})),
        );

        let prior_configuration = d.get_list("redis_configuration").first().cloned();
        d.set(
            "redis_configuration",
            flatten_redis_configuration(props.get("redisConfiguration"), prior_configuration.as_ref()),
        );

        let host = text("hostName");
        let ssl_port = number("sslPort").unwrap_or_default();
        let primary_key = keys.get("primaryKey").and_then(|v| v.as_str()).unwrap_or_default();
        let secondary_key = keys.get("secondaryKey").and_then(|v| v.as_str()).unwrap_or_default();
        d.set(
            "primary_connection_string",
            connection_string(host, ssl_port, primary_key, !non_ssl_port),
        );
        d.set(
            "secondary_connection_string",
            connection_string(host, ssl_port, secondary_key, !non_ssl_port),
        );
        d.set("primary_access_key", primary_key);
        d.set("secondary_access_key", secondary_key);

        d.set("tags", tags::flatten(cache.get("tags")));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = RedisId::parse(d.id())?;
        tracing::info!("Preparing arguments for {} update", id);

        let sku_name = d.get_str("sku_name");
        let mut properties = json!({
            "minimumTlsVersion": d.get_str("minimum_tls_version"),
            "enableNonSslPort": d.get_bool("enable_non_ssl_port"),
            "sku": {
                "capacity": d.get_i64("capacity"),
                "family": d.get_str("family"),
                "name": sku_name,
            },
        });
        for (attribute, key) in [
            ("shard_count", "shardCount"),
            ("replicas_per_master", "replicasPerMaster"),
            ("replicas_per_primary", "replicasPerPrimary"),
            ("redis_version", "redisVersion"),
        ] {
            if d.has_change(attribute) {
                if let Some(v) = d.get_ok(attribute) {
                    properties[key] = v.clone();
                }
            }
        }
        if d.has_change("public_network_access_enabled") {
            properties["publicNetworkAccess"] =
                json!(public_network_access(d.get_bool("public_network_access_enabled")));
        }
        if d.has_change("redis_configuration") {
            let configuration = expand_redis_configuration(
                d.get_list("redis_configuration").first(),
                sku_name,
                d.get_ok("subnet_id").is_some(),
            )
            .with_context(|| format!("parsing Redis Configuration for {}", id))?;
            properties["redisConfiguration"] = Value::Object(configuration);
        }
        if d.has_change("tenant_settings") {
            properties["tenantSettings"] = Value::Object(d.get_map("tenant_settings"));
        }

        let body = json!({
            "properties": properties,
            "tags": tags::expand(&d.get_map("tags"))?,
        });

        meta.client
            .patch_then_poll(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("updating {}", id))?;

        tracing::debug!("Waiting for {} to become available", id);
        let mut pending = PENDING_STATES.to_vec();
        pending.push("UpgradingRedisServerVersion");
        wait_for_provisioning(meta, &id, &pending, d.time_remaining()).await?;

        if d.has_change("patch_schedule") {
            match expand_patch_schedule(d.get_list("patch_schedule")) {
                Some(schedule) => {
                    meta.client
                        .put(&patch_schedule_id(&id), API_VERSION, &schedule)
                        .await
                        .with_context(|| format!("setting Patch Schedule for {}", id))?;
                }
                None => match meta.client.delete(&patch_schedule_id(&id), API_VERSION).await {
                    Ok(()) => {}
                    Err(e) if was_not_found(&e) => {}
                    Err(e) => return Err(e.context(format!("deleting Patch Schedule for {}", id))),
                },
            }
        }

        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = RedisId::parse(d.id())?;

        let Some(existing) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            return Ok(());
        };

        let subnet_ids: Vec<String> = existing
            .pointer("/properties/subnetId")
            .and_then(|v| v.as_str())
            .map(String::from)
            .into_iter()
            .collect();
        let _subnets = lock_subnets(&meta.locks, &subnet_ids).await?;

        match meta.client.delete_then_poll(&id.id(), API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if was_not_found(&e) => Ok(()),
            Err(e) => Err(e.context(format!("deleting {}", id))),
        }
    }
}

fn patch_schedule_id(id: &RedisId) -> String {
    format!("{}/patchSchedules/default", id.id())
}

fn public_network_access(enabled: bool) -> &'static str {
    if enabled {
        "Enabled"
    } else {
        "Disabled"
    }
}

async fn provisioning_state(client: &ArmClient, id: &str) -> Result<Refreshed> {
    let Some(cache) = client.get_if_exists(id, API_VERSION).await? else {
        return Ok(None);
    };
    let state = cache
        .pointer("/properties/provisioningState")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(Some((cache, state)))
}

async fn wait_for_provisioning(
    meta: &ProviderMeta,
    id: &RedisId,
    pending: &[&str],
    timeout: Duration,
) -> Result<()> {
    let client = &meta.client;
    let resource_id = id.id();
    let resource_id = resource_id.as_str();

    StateChangeConf::new(pending, &["Succeeded"], timeout, move || {
        provisioning_state(client, resource_id)
    })
    .poll_interval(meta.poll_interval(MIN_POLL_INTERVAL))
    .wait_for_state()
    .await
    .with_context(|| format!("waiting for {} to become available", id))?;

    Ok(())
}

fn sku_rank(sku_name: &str) -> Option<u8> {
    [SKU_BASIC, "Standard", SKU_PREMIUM]
        .iter()
        .position(|s| s.eq_ignore_ascii_case(sku_name))
        .map(|p| p as u8)
}

fn is_sku_downgrade(old: &str, new: &str) -> bool {
    matches!((sku_rank(old), sku_rank(new)), (Some(o), Some(n)) if n < o)
}

/// The API reports e.g. `6.0.14`; configurations name the major version
fn major_version(version: &str) -> String {
    version.split('.').next().unwrap_or_default().to_string()
}

fn connection_string(host: &str, ssl_port: i64, access_key: &str, ssl: bool) -> String {
    format!(
        "{}:{},password={},ssl={},abortConnect=False",
        host, ssl_port, access_key, ssl
    )
}
