//! `redis_configuration` and `patch_schedule` blocks
//!
//! The API carries every Redis setting as a string under a dashed key
//! (`maxmemory-policy`, `rdb-backup-enabled`, ...).

use crate::plugin::data::{i64_field, opt_str_field, str_field};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use anyhow::Result;
use serde_json::{json, Map, Value};

pub const SKU_BASIC: &str = "Basic";
pub const SKU_PREMIUM: &str = "Premium";

/// Integer settings: (block attribute, API key)
const MEMORY_SETTINGS: [(&str, &str); 3] = [
    ("maxmemory_delta", "maxmemory-delta"),
    ("maxmemory_reserved", "maxmemory-reserved"),
    ("maxfragmentationmemory_reserved", "maxfragmentationmemory-reserved"),
];

/// Settings the API may omit from responses; kept from prior state when missing
const SECRET_SETTINGS: [(&str, &str); 3] = [
    ("rdb_storage_connection_string", "rdb-storage-connection-string"),
    ("aof_storage_connection_string_0", "aof-storage-connection-string-0"),
    ("aof_storage_connection_string_1", "aof-storage-connection-string-1"),
];

pub fn redis_configuration_schema() -> Schema {
    let secret = || Attribute::optional(AttrType::String).sensitive();
    Schema::new()
        .with("maxclients", Attribute::computed(AttrType::Int))
        .with("maxmemory_delta", Attribute::optional_computed(AttrType::Int))
        .with("maxmemory_reserved", Attribute::optional_computed(AttrType::Int))
        .with("maxfragmentationmemory_reserved", Attribute::optional_computed(AttrType::Int))
        .with(
            "maxmemory_policy",
            Attribute::optional(AttrType::String).default_value("volatile-lru"),
        )
        .with("rdb_backup_enabled", Attribute::optional(AttrType::Bool))
        .with("rdb_backup_frequency", Attribute::optional(AttrType::Int))
        .with("rdb_backup_max_snapshot_count", Attribute::optional(AttrType::Int))
        .with("rdb_storage_connection_string", secret())
        .with("notify_keyspace_events", Attribute::optional(AttrType::String))
        .with("aof_backup_enabled", Attribute::optional(AttrType::Bool))
        .with("aof_storage_connection_string_0", secret())
        .with("aof_storage_connection_string_1", secret())
        .with(
            "enable_authentication",
            Attribute::optional(AttrType::Bool).default_value(true),
        )
}

pub fn patch_schedule_schema() -> Schema {
    Schema::new()
        .with("day_of_week", Attribute::required(AttrType::String))
        .with(
            "maintenance_window",
            Attribute::optional(AttrType::String).default_value("PT5H"),
        )
        .with("start_hour_utc", Attribute::optional(AttrType::Int))
}

/// Build `redisConfiguration` from the (single) configuration block
pub fn expand_redis_configuration(
    block: Option<&Value>,
    sku_name: &str,
    in_virtual_network: bool,
) -> Result<Map<String, Value>> {
    let mut output = Map::new();
    let Some(raw) = block.filter(|b| b.is_object()) else {
        return Ok(output);
    };
    let premium = sku_name.eq_ignore_ascii_case(SKU_PREMIUM);
    let mut put = |key: &str, value: String| {
        output.insert(key.to_string(), Value::String(value));
    };

    if !sku_name.eq_ignore_ascii_case(SKU_BASIC) {
        for (attribute, key) in MEMORY_SETTINGS {
            let v = i64_field(raw, attribute);
            if v > 0 {
                put(key, v.to_string());
            }
        }
    }
    if let Some(policy) = opt_str_field(raw, "maxmemory_policy") {
        put("maxmemory-policy", policy.to_string());
    }

    if let Some(enabled) = raw.get("rdb_backup_enabled").and_then(|v| v.as_bool()) {
        if premium {
            put("rdb-backup-enabled", enabled.to_string());
        } else if enabled {
            anyhow::bail!("The `rdb_backup_enabled` property requires a `Premium` sku to be set");
        }
    }
    let frequency = i64_field(raw, "rdb_backup_frequency");
    if frequency > 0 {
        put("rdb-backup-frequency", frequency.to_string());
    }
    let snapshots = i64_field(raw, "rdb_backup_max_snapshot_count");
    if snapshots > 0 {
        put("rdb-backup-max-snapshot-count", snapshots.to_string());
    }
    if let Some(events) = opt_str_field(raw, "notify_keyspace_events") {
        put("notify-keyspace-events", events.to_string());
    }

    if let Some(enabled) = raw.get("aof_backup_enabled").and_then(|v| v.as_bool()) {
        if premium {
            put("aof-backup-enabled", enabled.to_string());
        } else if enabled {
            anyhow::bail!("The `aof_backup_enabled` property requires a `Premium` sku to be set");
        }
    }
    for (attribute, key) in SECRET_SETTINGS {
        if let Some(v) = opt_str_field(raw, attribute) {
            put(key, v.to_string());
        }
    }

    // authentication can only be turned off inside a virtual network
    let auth_enabled = raw
        .get("enable_authentication")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    if in_virtual_network {
        let not_required = if auth_enabled { "no" } else { "yes" };
        put("authnotrequired", not_required.to_string());
    } else if !auth_enabled {
        anyhow::bail!("Cannot set `enable_authentication` to `false` when `subnet_id` is not set");
    }

    let rdb_enabled = output.get("rdb-backup-enabled").and_then(|v| v.as_str()) == Some("true");
    let has_storage = output.contains_key("rdb-storage-connection-string");
    if rdb_enabled && !has_storage {
        anyhow::bail!(
            "The `rdb_storage_connection_string` property must be set when `rdb_backup_enabled` is true"
        );
    }

    Ok(output)
}

fn parse_int(value: Option<&Value>) -> Value {
    value
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            other => other.as_i64(),
        })
        .map(Value::from)
        .unwrap_or(Value::Null)
}

fn parse_bool(value: Option<&Value>) -> Value {
    value
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse::<bool>().ok(),
            other => other.as_bool(),
        })
        .map(Value::Bool)
        .unwrap_or(Value::Null)
}

/// Block form of `redisConfiguration`; `prior` supplies secrets the API withholds
pub fn flatten_redis_configuration(input: Option<&Value>, prior: Option<&Value>) -> Vec<Value> {
    let Some(input) = input.filter(|v| v.is_object()) else {
        return Vec::new();
    };
    let text = |key: &str| input.get(key).cloned().unwrap_or(Value::Null);

    let mut output = json!({
        "maxclients": parse_int(input.get("maxclients")),
        "maxmemory_policy": text("maxmemory-policy"),
        "rdb_backup_enabled": parse_bool(input.get("rdb-backup-enabled")),
        "rdb_backup_frequency": parse_int(input.get("rdb-backup-frequency")),
        "rdb_backup_max_snapshot_count": parse_int(input.get("rdb-backup-max-snapshot-count")),
        "notify_keyspace_events": text("notify-keyspace-events"),
        "aof_backup_enabled": parse_bool(input.get("aof-backup-enabled")),
        // `authnotrequired` is only returned for caches inside a virtual network
        "enable_authentication": input
            .get("authnotrequired")
            .and_then(|v| v.as_str())
            .map(|v| !v.eq_ignore_ascii_case("yes"))
            .unwrap_or(true),
    });

    for (attribute, key) in MEMORY_SETTINGS {
        output[attribute] = parse_int(input.get(key));
    }
    for (attribute, key) in SECRET_SETTINGS {
        let value = input
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| prior.and_then(|p| p.get(attribute)))
            .cloned()
            .unwrap_or(Value::Null);
        output[attribute] = value;
    }

    vec![output]
}

/// `patchSchedules/default` body, `None` when no schedule is configured
pub fn expand_patch_schedule(input: &[Value]) -> Option<Value> {
    if input.is_empty() {
        return None;
    }

    let entries: Vec<Value> = input
        .iter()
        .map(|entry| {
            json!({
                "dayOfWeek": str_field(entry, "day_of_week"),
                "maintenanceWindow": opt_str_field(entry, "maintenance_window").unwrap_or("PT5H"),
                "startHourUtc": i64_field(entry, "start_hour_utc"),
            })
        })
        .collect();

    Some(json!({ "properties": { "scheduleEntries": entries } }))
}

pub fn flatten_patch_schedule(input: &Value) -> Vec<Value> {
    input
        .pointer("/properties/scheduleEntries")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .map(|entry| {
            json!({
                "day_of_week": entry.get("dayOfWeek").cloned().unwrap_or(Value::Null),
                "maintenance_window": entry.get("maintenanceWindow").cloned().unwrap_or(Value::Null),
                "start_hour_utc": entry.get("startHourUtc").and_then(|v| v.as_i64()).unwrap_or(0),
            })
        })
        .collect()
}
