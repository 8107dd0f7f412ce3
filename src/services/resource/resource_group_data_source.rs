use super::API_VERSION;
use crate::arm::ids::ResourceGroupId;
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::ResourceData;
use crate::plugin::resource::{DataSource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub struct ResourceGroupDataSource;

#[async_trait]
impl DataSource for ResourceGroupDataSource {
    fn type_name(&self) -> &'static str {
        "azurerm_resource_group"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with("name", Attribute::required(AttrType::String))
            .with("location", commonschema::location_computed())
            .with("managed_by", Attribute::computed(AttrType::String))
            .with("tags", tags::schema_computed())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5, 5)
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = ResourceGroupId::new(&meta.subscription_id, d.get_str("name"));

        let group = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
            .with_context(|| format!("{} was not found", id))?;

        d.set_id(id.id());
        d.set("location", location::normalize_nilable(group.get("location")));
        d.set("managed_by", group.get("managedBy").cloned().unwrap_or(Value::Null));
        d.set("tags", tags::flatten(group.get("tags")));
        Ok(())
    }
}
