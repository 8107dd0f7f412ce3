//! Resource state bag
//!
//! [`ResourceData`] layers three sources of attribute values: values set by
//! the running handler, the (defaulted) configuration, and the prior state.
//! Reads look through the layers in that order.

use super::resource::{Operation, Timeouts};
use super::schema::{equivalent, is_zero, AttrType, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

static NULL: Value = Value::Null;

/// Persisted record of a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

pub struct ResourceData {
    schema: Schema,
    id: String,
    new_resource: bool,
    config: Map<String, Value>,
    prior: Map<String, Value>,
    set: Map<String, Value>,
    /// Configuration is authoritative: only computed attributes fall back to prior
    config_authoritative: bool,
    timeouts: Timeouts,
    deadline: Option<Instant>,
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl ResourceData {
    fn empty(schema: Schema) -> Self {
        Self {
            schema,
            id: String::new(),
            new_resource: false,
            config: Map::new(),
            prior: Map::new(),
            set: Map::new(),
            config_authoritative: false,
            timeouts: Timeouts::default(),
            deadline: None,
        }
    }

    /// A resource about to be created from `config`
    pub fn for_create(schema: Schema, config: Value) -> Self {
        Self {
            new_resource: true,
            config: into_object(config),
            ..Self::empty(schema)
        }
    }

    /// An existing resource being updated to `config`
    ///
    /// Computed attributes the configuration leaves out keep their prior values.
    /// Anything else the configuration leaves out reads as unset.
    pub fn for_update(schema: Schema, config: Value, prior: &ResourceState) -> Self {
        Self {
            id: prior.id.clone(),
            config: into_object(config),
            prior: prior.attributes.clone(),
            config_authoritative: true,
            ..Self::empty(schema)
        }
    }

    /// An existing resource being read or deleted
    pub fn from_state(schema: Schema, state: &ResourceState) -> Self {
        Self {
            id: state.id.clone(),
            prior: state.attributes.clone(),
            ..Self::empty(schema)
        }
    }

    /// Only the id is known
    pub fn for_import(schema: Schema, id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::empty(schema)
        }
    }

    pub fn for_data_source(schema: Schema, config: Value) -> Self {
        Self {
            config: into_object(config),
            ..Self::empty(schema)
        }
    }

    /// Set the operation time limits used by [`Self::timeout_for`]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Start the clock for an operation
    pub fn begin(&mut self, operation: Operation) {
        self.deadline = Instant::now().checked_add(self.timeouts.get(operation));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// An empty id marks the resource as gone
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn is_new_resource(&self) -> bool {
        self.new_resource
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Values set by the handler win, even when set to null
    fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.set.get(key) {
            return Some(value);
        }
        if let Some(value) = self.config.get(key).filter(|v| !v.is_null()) {
            return Some(value);
        }
        if self.config_authoritative
            && !self.schema.attribute(key).is_some_and(|a| a.computed)
        {
            return None;
        }
        self.prior.get(key).filter(|v| !v.is_null())
    }

    /// Current value of an attribute, Null when unset
    pub fn get(&self, key: &str) -> &Value {
        self.lookup(key).unwrap_or(&NULL)
    }

    /// Value of an attribute only when it is set to a non-zero value
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        Some(self.get(key)).filter(|v| !is_zero(v))
    }

    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).as_str().unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).as_bool().unwrap_or_default()
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get(key).as_i64().unwrap_or_default()
    }

    pub fn get_f64(&self, key: &str) -> f64 {
        self.get(key).as_f64().unwrap_or_default()
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key).as_array().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn get_map(&self, key: &str) -> Map<String, Value> {
        self.get(key).as_object().cloned().unwrap_or_default()
    }

    /// String elements of a list or set attribute
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .iter()
            .filter_map(|v| v.as_str())
            .map(String::from)
            .collect()
    }

    /// Whether the configuration changes an attribute relative to prior state
    pub fn has_change(&self, key: &str) -> bool {
        let Some(attribute) = self.schema.attribute(key) else {
            return false;
        };
        let desired = self.config.get(key).unwrap_or(&NULL);
        if attribute.computed && desired.is_null() {
            return false;
        }
        let prior = self.prior.get(key).unwrap_or(&NULL);
        !equivalent(&attribute.ty, desired, prior)
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    // =========================================================================
    // Setters
    // =========================================================================

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        if self.schema.attribute(key).is_none() {
            tracing::warn!("Ignoring value for unknown attribute {:?}", key);
            return;
        }
        self.set.insert(key.to_string(), value.into());
    }

    // =========================================================================
    // Timeouts
    // =========================================================================

    pub fn timeout_for(&self, operation: Operation) -> Duration {
        self.timeouts.get(operation)
    }

    /// Time left before the current operation's deadline
    pub fn time_remaining(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => self.timeouts.get(if self.new_resource {
                Operation::Create
            } else {
                Operation::Update
            }),
        }
    }

    /// Final state, or `None` when the id was cleared
    pub fn into_state(self) -> Option<ResourceState> {
        if self.id.is_empty() {
            return None;
        }

        let attributes = self
            .schema
            .attributes
            .iter()
            .map(|(name, attribute)| {
                let value = self
                    .lookup(name)
                    .filter(|v| !v.is_null())
                    .cloned()
                    .unwrap_or_else(|| empty_value(&attribute.ty));
                (name.clone(), value)
            })
            .collect();

        Some(ResourceState {
            id: self.id,
            schema_version: self.schema.version,
            attributes,
        })
    }
}

fn empty_value(ty: &AttrType) -> Value {
    match ty {
        AttrType::List(_) | AttrType::Set(_) => Value::Array(Vec::new()),
        AttrType::Map(_) => Value::Object(Map::new()),
        _ => Value::Null,
    }
}

// =============================================================================
// Nested block helpers
// =============================================================================

pub fn str_field<'a>(block: &'a Value, key: &str) -> &'a str {
    block.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

/// Non-empty string field
pub fn opt_str_field<'a>(block: &'a Value, key: &str) -> Option<&'a str> {
    block
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

pub fn bool_field(block: &Value, key: &str) -> bool {
    block.get(key).and_then(|v| v.as_bool()).unwrap_or_default()
}

pub fn i64_field(block: &Value, key: &str) -> i64 {
    block.get(key).and_then(|v| v.as_i64()).unwrap_or_default()
}

pub fn list_field<'a>(block: &'a Value, key: &str) -> &'a [Value] {
    block
        .get(key)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}
