//! Resource and data source traits
//!
//! Every managed type implements [`Resource`] (or [`DataSource`]) and is
//! driven by the dispatcher through a [`ResourceData`] state bag.

use super::data::{ResourceData, ResourceState};
use super::schema::Schema;
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// CRUD operation being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Per-operation time limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    /// Timeouts given in minutes, the way resources declare them
    pub fn minutes(create: u64, read: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(read * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }

    pub fn get(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Apply a user `timeouts` block, e.g. `{"create": "1h30m", "delete": "45m"}`
    pub fn with_overrides(mut self, block: Option<&Value>) -> Result<Self> {
        let Some(block) = block.filter(|v| !v.is_null()) else {
            return Ok(self);
        };
        let Some(entries) = block.as_object() else {
            anyhow::bail!("timeouts: expected an object");
        };

        for (key, value) in entries {
            let Some(raw) = value.as_str() else {
                anyhow::bail!("timeouts.{}: expected a duration string", key);
            };
            let duration =
                parse_duration(raw).with_context(|| format!("timeouts.{}", key))?;
            match key.as_str() {
                "create" => self.create = duration,
                "read" => self.read = duration,
                "update" => self.update = duration,
                "delete" => self.delete = duration,
                other => anyhow::bail!("timeouts.{}: unsupported argument", other),
            }
        }

        Ok(self)
    }
}

/// Parse durations like `90m`, `1h30m`, `45s` or `500ms`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration");
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            anyhow::bail!("invalid duration {:?}: expected a number", input);
        }
        let amount: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("invalid duration {:?}", input))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "h" => amount.checked_mul(3600).map(Duration::from_secs),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(amount)),
            "ms" => Some(Duration::from_millis(amount)),
            "" => anyhow::bail!("invalid duration {:?}: missing unit", input),
            other => anyhow::bail!("invalid duration {:?}: unknown unit {:?}", input, other),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .with_context(|| format!("invalid duration {:?}: duration too large", input))?;
    }

    Ok(total)
}

/// A managed resource type
#[async_trait]
pub trait Resource: Send + Sync {
    /// Type name used in configurations, e.g. `azurerm_redis_cache`
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Check that an id handed to `import` belongs to this type
    fn validate_id(&self, id: &str) -> Result<()>;

    /// Attributes whose change from `prior` to `config` cannot be applied in
    /// place, on top of the schema's `force_new` flags
    fn force_new_if_change(&self, _config: &Value, _prior: &ResourceState) -> Vec<String> {
        Vec::new()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()>;

    /// Refresh state; clears the id when the object no longer exists
    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()>;

    async fn update(&self, _meta: &ProviderMeta, _d: &mut ResourceData) -> Result<()> {
        anyhow::bail!("{} does not support in-place updates", self.type_name())
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()>;
}

/// A read-only lookup
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()>;
}

/// Create found an object that is not tracked in state yet
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "a resource with the ID {id:?} already exists - to be managed it needs to be imported \
     into the state. Please see the documentation for {type_name:?} for more information"
)]
pub struct ImportAsExistsError {
    pub type_name: String,
    pub id: String,
}

pub fn import_as_exists_error(type_name: &str, id: &str) -> anyhow::Error {
    ImportAsExistsError {
        type_name: type_name.to_string(),
        id: id.to_string(),
    }
    .into()
}
