use super::{API_VERSION, DATABASE_RESOURCE_NAME};
use crate::arm::client::{was_not_found, ArmClient};
use crate::arm::ids::{SqlDatabaseId, SqlServerId};
use crate::helpers::tags;
use crate::plugin::data::{ResourceData, ResourceState};
use crate::plugin::resource::{import_as_exists_error, Resource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::plugin::wait::{Refreshed, StateChangeConf};
use crate::provider::ProviderMeta;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

const BYTES_PER_GB: i64 = 1_073_741_824;
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAINTENANCE_CONFIGURATION: &str = "SQL_Default";

const DATABASE_STATUSES: [&str; 24] = [
    "AutoClosed",
    "Copying",
    "Creating",
    "Disabled",
    "EmergencyMode",
    "Inaccessible",
    "Offline",
    "OfflineChangingDwPerformanceTiers",
    "OfflineSecondary",
    "Online",
    "OnlineChangingDwPerformanceTiers",
    "Paused",
    "Pausing",
    "Recovering",
    "RecoveryPending",
    "Restoring",
    "Resuming",
    "Scaling",
    "Shutdown",
    "Standby",
    "Starting",
    "Stopped",
    "Stopping",
    "Suspect",
];

pub struct MsSqlDatabaseResource;

#[async_trait]
impl Resource for MsSqlDatabaseResource {
    fn type_name(&self) -> &'static str {
        "azurerm_mssql_database"
    }

    fn schema(&self) -> Schema {
        let optional_string = || Attribute::optional(AttrType::String);
        Schema::new()
            .with_version(1)
            .with("name", Attribute::required(AttrType::String).force_new())
            .with("server_id", Attribute::required(AttrType::String).force_new())
            .with("auto_pause_delay_in_minutes", Attribute::optional_computed(AttrType::Int))
            .with(
                "create_mode",
                optional_string().force_new().default_value("Default"),
            )
            .with("collation", Attribute::optional_computed(AttrType::String).force_new())
            .with("elastic_pool_id", optional_string())
            .with("license_type", Attribute::optional_computed(AttrType::String))
            .with("max_size_gb", Attribute::optional_computed(AttrType::Int))
            .with("min_capacity", Attribute::optional_computed(AttrType::Float))
            .with("restore_point_in_time", Attribute::optional_computed(AttrType::String))
            .with("recover_database_id", optional_string())
            .with("restore_dropped_database_id", optional_string())
            .with("read_replica_count", Attribute::optional_computed(AttrType::Int))
            .with("read_scale", Attribute::optional_computed(AttrType::Bool))
            .with("sample_name", Attribute::optional_computed(AttrType::String))
            .with("sku_name", Attribute::optional_computed(AttrType::String))
            .with(
                "creation_source_database_id",
                Attribute::optional_computed(AttrType::String).force_new(),
            )
            .with("storage_account_type", optional_string().default_value("Geo"))
            .with("zone_redundant", Attribute::optional_computed(AttrType::Bool))
            .with("geo_backup_enabled", Attribute::optional(AttrType::Bool).default_value(true))
            .with("maintenance_configuration_name", Attribute::optional_computed(AttrType::String))
            .with("ledger_enabled", Attribute::optional_computed(AttrType::Bool).force_new())
            .with(
                "transparent_data_encryption_enabled",
                Attribute::optional(AttrType::Bool).default_value(true),
            )
            .with("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        SqlDatabaseId::parse(id)?;
        Ok(())
    }

    /// Hyperscale databases cannot be moved back to another tier in place
    fn force_new_if_change(&self, config: &Value, prior: &ResourceState) -> Vec<String> {
        let old = prior
            .attributes
            .get("sku_name")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let new = config.get("sku_name").and_then(|v| v.as_str());
        match new {
            Some(new) if is_hyperscale(old) && !new.is_empty() && !is_hyperscale(new) => {
                vec!["sku_name".to_string()]
            }
            _ => Vec::new(),
        }
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        tracing::info!("preparing arguments for MsSql Database creation");

        let sku_name = d.get_str("sku_name");
        if sku_name.starts_with("GP_S_") && d.get_ok("license_type").is_some() {
            bail!("serverless databases do not support license type");
        }
        validate_encryption(d)?;

        let server_id = SqlServerId::parse(d.get_str("server_id"))
            .context("parsing `server_id`")?;
        let id = SqlDatabaseId::new(
            &server_id.subscription_id,
            &server_id.resource_group_name,
            &server_id.server_name,
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

        let server = meta
            .client
            .get(&server_id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", server_id))?;
        let location = server
            .get("location")
            .and_then(|v| v.as_str())
            .filter(|l| !l.is_empty())
            .with_context(|| format!("reading location of {}", server_id))?;

        let _lock = meta.locks.by_name(&id.id(), DATABASE_RESOURCE_NAME).await;

        let body = expand_database(d, &meta.subscription_id, location)?;

        meta.client
            .put_then_poll(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("creating {}", id))?;

        wait_until_online(meta, &id, d.time_remaining()).await?;

        if !is_secondary(d.get_str("create_mode")) {
            set_transparent_data_encryption(&meta.client, &id, d).await?;
        }
        if d.get_str("sku_name").starts_with("DW") {
            set_geo_backup_policy(&meta.client, &id, d.get_bool("geo_backup_enabled")).await?;
        }

        d.set_id(id.id());
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = SqlDatabaseId::parse(d.id())?;

        let Some(database) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        d.set("name", id.database_name.as_str());
        d.set("server_id", id.server_id().id());

        let props = database.get("properties").unwrap_or(&Value::Null);
        let field = |key: &str| props.get(key).cloned().unwrap_or(Value::Null);

        d.set("auto_pause_delay_in_minutes", field("autoPauseDelay"));
        d.set("collation", field("collation"));
        d.set("elastic_pool_id", field("elasticPoolId"));
        d.set("min_capacity", field("minCapacity"));
        d.set("read_replica_count", field("highAvailabilityReplicaCount"));
        d.set("zone_redundant", field("zoneRedundant"));
        d.set("ledger_enabled", field("isLedgerOn"));
        d.set("sku_name", field("currentServiceObjectiveName"));
        d.set("storage_account_type", field("currentBackupStorageRedundancy"));
        d.set(
            "read_scale",
            props
                .get("readScale")
                .and_then(|v| v.as_str())
                .map(|s| s.eq_ignore_ascii_case("Enabled")),
        );
        if let Some(bytes) = props.get("maxSizeBytes").and_then(|v| v.as_i64()) {
            d.set("max_size_gb", bytes / BYTES_PER_GB);
        }
        // only returned for some skus
        if let Some(license_type) = props.get("licenseType").and_then(|v| v.as_str()) {
            d.set("license_type", license_type);
        }
        if let Some(maintenance) = props.get("maintenanceConfigurationId").and_then(|v| v.as_str()) {
            d.set("maintenance_configuration_name", last_segment(maintenance));
        }

        let sku_name = d.get_str("sku_name").to_string();
        if sku_name.starts_with("DW") {
            let policy = meta
                .client
                .get(&format!("{}/geoBackupPolicies/Default", id.id()), API_VERSION)
                .await
                .with_context(|| format!("retrieving Geo Backup Policy for {}", id))?;
            let state = policy.pointer("/properties/state").and_then(|v| v.as_str());
            d.set("geo_backup_enabled", state.is_some_and(|s| s.eq_ignore_ascii_case("Enabled")));
        }

        let tde = meta
            .client
            .get(&transparent_data_encryption_id(&id), API_VERSION)
            .await
            .with_context(|| format!("retrieving Transparent Data Encryption for {}", id))?;
        let tde_state = tde.pointer("/properties/state").and_then(|v| v.as_str());
        d.set(
            "transparent_data_encryption_enabled",
            tde_state.is_some_and(|s| s.eq_ignore_ascii_case("Enabled")),
        );

        d.set("tags", tags::flatten(database.get("tags")));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = SqlDatabaseId::parse(d.id())?;
        tracing::info!("preparing arguments for {} update", id);
        validate_encryption(d)?;

        let _lock = meta.locks.by_name(&id.id(), DATABASE_RESOURCE_NAME).await;

        let mut properties = Map::new();
        for (attribute, key) in [
            ("auto_pause_delay_in_minutes", "autoPauseDelay"),
            ("elastic_pool_id", "elasticPoolId"),
            ("license_type", "licenseType"),
            ("min_capacity", "minCapacity"),
            ("read_replica_count", "highAvailabilityReplicaCount"),
            ("zone_redundant", "zoneRedundant"),
        ] {
            if d.has_change(attribute) {
                properties.insert(key.to_string(), d.get(attribute).clone());
            }
        }
        if d.has_change("max_size_gb") && !is_secondary(d.get_str("create_mode")) {
            properties.insert("maxSizeBytes".to_string(), json!(d.get_i64("max_size_gb") * BYTES_PER_GB));
        }
        if d.has_change("read_scale") {
            properties.insert("readScale".to_string(), json!(read_scale(d.get_bool("read_scale"))));
        }
        if d.has_change("storage_account_type") {
            properties.insert(
                "requestedBackupStorageRedundancy".to_string(),
                json!(d.get_str("storage_account_type")),
            );
        }
        if d.has_changes(&["maintenance_configuration_name", "elastic_pool_id"]) {
            if let Some(maintenance) = maintenance_configuration_id(d, &meta.subscription_id) {
                properties.insert("maintenanceConfigurationId".to_string(), json!(maintenance));
            }
        }

        let mut body = json!({
            "properties": properties,
            "tags": tags::expand(&d.get_map("tags"))?,
        });
        if d.has_change("sku_name") {
            body["sku"] = json!({ "name": d.get_str("sku_name") });
        }

        meta.client
            .patch_then_poll(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("updating {}", id))?;

        wait_until_online(meta, &id, d.time_remaining()).await?;

        if d.has_change("transparent_data_encryption_enabled") {
            set_transparent_data_encryption(&meta.client, &id, d).await?;
        }
        if d.has_change("geo_backup_enabled") && d.get_str("sku_name").starts_with("DW") {
            set_geo_backup_policy(&meta.client, &id, d.get_bool("geo_backup_enabled")).await?;
        }

        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = SqlDatabaseId::parse(d.id())?;

        let _lock = meta.locks.by_name(&id.id(), DATABASE_RESOURCE_NAME).await;

        match meta.client.delete_then_poll(&id.id(), API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if was_not_found(&e) => Ok(()),
            Err(e) => Err(e.context(format!("deleting {}", id))),
        }
    }
}

fn is_hyperscale(sku_name: &str) -> bool {
    sku_name.starts_with("HS")
}

fn is_secondary(create_mode: &str) -> bool {
    matches!(create_mode, "Secondary" | "OnlineSecondary")
}

fn read_scale(enabled: bool) -> &'static str {
    if enabled {
        "Enabled"
    } else {
        "Disabled"
    }
}

fn last_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or_default()
}

fn transparent_data_encryption_id(id: &SqlDatabaseId) -> String {
    format!("{}/transparentDataEncryption/current", id.id())
}

/// Encryption can only be turned off for data warehouse skus
fn validate_encryption(d: &ResourceData) -> Result<()> {
    let sku_name = d.get_str("sku_name");
    if !d.get_bool("transparent_data_encryption_enabled") && !sku_name.starts_with("DW") {
        bail!(
            "transparent data encryption can only be disabled on Data Warehouse SKUs, got {:?}",
            sku_name
        );
    }
    Ok(())
}

/// Create modes that copy or restore from another database and the
/// attribute naming that database
fn required_source(create_mode: &str) -> Option<&'static str> {
    match create_mode {
        "Copy" | "PointInTimeRestore" | "Secondary" => Some("creation_source_database_id"),
        "Recovery" => Some("recover_database_id"),
        "Restore" => Some("restore_dropped_database_id"),
        _ => None,
    }
}

fn maintenance_configuration_id(d: &ResourceData, subscription_id: &str) -> Option<String> {
    if d.get_ok("elastic_pool_id").is_some() {
        return None;
    }
    let name = match d.get_str("maintenance_configuration_name") {
        "" => DEFAULT_MAINTENANCE_CONFIGURATION,
        name => name,
    };
    Some(format!(
        "/subscriptions/{}/providers/Microsoft.Maintenance/publicMaintenanceConfigurations/{}",
        subscription_id, name
    ))
}

/// Request body for creating the database described by `d`
fn expand_database(d: &ResourceData, subscription_id: &str, location: &str) -> Result<Value> {
    let create_mode = d.get_str("create_mode");
    if let Some(attribute) = required_source(create_mode) {
        if d.get_ok(attribute).is_none() {
            bail!("'{}' is required for create_mode {}", attribute, create_mode);
        }
    }

    let mut properties = Map::new();
    let mut insert = |key: &str, value: Value| {
        properties.insert(key.to_string(), value);
    };
    for (attribute, key) in [
        ("auto_pause_delay_in_minutes", "autoPauseDelay"),
        ("collation", "collation"),
        ("elastic_pool_id", "elasticPoolId"),
        ("license_type", "licenseType"),
        ("min_capacity", "minCapacity"),
        ("read_replica_count", "highAvailabilityReplicaCount"),
        ("sample_name", "sampleName"),
        ("zone_redundant", "zoneRedundant"),
        ("ledger_enabled", "isLedgerOn"),
        ("restore_point_in_time", "restorePointInTime"),
        ("creation_source_database_id", "sourceDatabaseId"),
        ("recover_database_id", "recoverableDatabaseId"),
        ("restore_dropped_database_id", "restorableDroppedDatabaseId"),
    ] {
        if let Some(v) = d.get_ok(attribute) {
            insert(key, v.clone());
        }
    }
    insert("createMode", json!(create_mode));
    insert(
        "requestedBackupStorageRedundancy",
        json!(d.get_str("storage_account_type")),
    );
    insert("readScale", json!(read_scale(d.get_bool("read_scale"))));

    let max_size_gb = d.get_i64("max_size_gb");
    if max_size_gb > 0 && !is_secondary(create_mode) {
        insert("maxSizeBytes", json!(max_size_gb * BYTES_PER_GB));
    }
    if let Some(maintenance) = maintenance_configuration_id(d, subscription_id) {
        insert("maintenanceConfigurationId", json!(maintenance));
    }

    let mut body = json!({
        "location": location,
        "properties": properties,
        "tags": tags::expand(&d.get_map("tags"))?,
    });
    if let Some(sku_name) = d.get_ok("sku_name") {
        body["sku"] = json!({ "name": sku_name });
    }
    Ok(body)
}

async fn set_transparent_data_encryption(
    client: &ArmClient,
    id: &SqlDatabaseId,
    d: &ResourceData,
) -> Result<()> {
    let state = if d.get_bool("transparent_data_encryption_enabled") {
        "Enabled"
    } else {
        "Disabled"
    };
    client
        .put(
            &transparent_data_encryption_id(id),
            API_VERSION,
            &json!({ "properties": { "state": state } }),
        )
        .await
        .with_context(|| format!("setting Transparent Data Encryption for {}", id))?;
    Ok(())
}

async fn set_geo_backup_policy(client: &ArmClient, id: &SqlDatabaseId, enabled: bool) -> Result<()> {
    let state = if enabled { "Enabled" } else { "Disabled" };
    client
        .put(
            &format!("{}/geoBackupPolicies/Default", id.id()),
            API_VERSION,
            &json!({ "properties": { "state": state } }),
        )
        .await
        .with_context(|| format!("setting Geo Backup Policy for {}", id))?;
    Ok(())
}

async fn database_status(client: &ArmClient, id: &str) -> Result<Refreshed> {
    let Some(database) = client.get_if_exists(id, API_VERSION).await? else {
        return Ok(None);
    };
    let status = database
        .pointer("/properties/status")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(Some((database, status)))
}

async fn wait_until_online(meta: &ProviderMeta, id: &SqlDatabaseId, timeout: Duration) -> Result<()> {
    let pending: Vec<&str> = DATABASE_STATUSES
        .iter()
        .copied()
        .filter(|s| *s != "Online")
        .collect();
    let client = &meta.client;
    let database_id = id.id();
    let database_id = database_id.as_str();

    StateChangeConf::new(&pending, &["Online"], timeout, move || {
        database_status(client, database_id)
    })
    .poll_interval(meta.poll_interval(MIN_POLL_INTERVAL))
    .continuous_target_occurence(2)
    .wait_for_state()
    .await
    .with_context(|| format!("waiting for {} to become online", id))?;

    Ok(())
}
