use super::API_VERSION;
use crate::arm::client::was_not_found;
use crate::arm::ids::ResourceGroupId;
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::ResourceData;
use crate::plugin::resource::{import_as_exists_error, Resource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

/// API version of the generic resources listing
const RESOURCES_API_VERSION: &str = "2021-04-01";

pub struct ResourceGroupResource;

#[async_trait]
impl Resource for ResourceGroupResource {
    fn type_name(&self) -> &'static str {
        "azurerm_resource_group"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .with("name", commonschema::name())
            .with("location", commonschema::location())
            .with("managed_by", Attribute::optional(AttrType::String).force_new())
            .with("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(90, 5, 90, 90)
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        ResourceGroupId::parse(id)?;
        Ok(())
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = ResourceGroupId::new(&meta.subscription_id, d.get_str("name"));

        let existing = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("checking for presence of existing {}", id))?;
        if existing.is_some() {
            return Err(import_as_exists_error(self.type_name(), &id.id()));
        }

        let mut body = json!({
            "location": d.get_str("location"),
            "tags": tags::expand(&d.get_map("tags"))?,
        });
        if let Some(managed_by) = d.get_ok("managed_by") {
            body["managedBy"] = managed_by.clone();
        }

        meta.client
            .put(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("creating {}", id))?;

        d.set_id(id.id());
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = ResourceGroupId::parse(d.id())?;

        let Some(group) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        d.set("name", id.resource_group_name.as_str());
        d.set("location", location::normalize_nilable(group.get("location")));
        d.set("managed_by", group.get("managedBy").cloned().unwrap_or(Value::Null));
        d.set("tags", tags::flatten(group.get("tags")));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = ResourceGroupId::parse(d.id())?;

        if d.has_change("tags") {
            let body = json!({ "tags": tags::expand(&d.get_map("tags"))? });
            meta.client
                .patch(&id.id(), API_VERSION, &body)
                .await
                .with_context(|| format!("updating {}", id))?;
        }

        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = ResourceGroupId::parse(d.id())?;

        if meta.features.resource_group.prevent_deletion_if_contains_resources {
            let nested = nested_resource_ids(meta, &id).await?;
            if !nested.is_empty() {
                anyhow::bail!(still_contains_resources(&id, &nested));
            }
        }

        match meta.client.delete_then_poll(&id.id(), API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if was_not_found(&e) => Ok(()),
            Err(e) => Err(e.context(format!("deleting {}", id))),
        }
    }
}

/// Ids of every resource inside the group, following `nextLink` pages
async fn nested_resource_ids(meta: &ProviderMeta, id: &ResourceGroupId) -> Result<Vec<String>> {
    let mut page = meta
        .client
        .get(&format!("{}/resources", id.id()), RESOURCES_API_VERSION)
        .await
        .with_context(|| format!("listing resources within {}", id))?;

    let mut ids = Vec::new();
    loop {
        ids.extend(
            page.get("value")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(|r| r.get("id").and_then(|v| v.as_str()))
                .map(String::from),
        );

        let next = page
            .get("nextLink")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(String::from);
        let Some(next) = next else {
            break;
        };
        page = meta
            .client
            .send_url(Method::GET, &next)
            .await
            .with_context(|| format!("listing resources within {}", id))?
            .body;
    }

    Ok(ids)
}

fn still_contains_resources(id: &ResourceGroupId, nested: &[String]) -> String {
    let listing = nested
        .iter()
        .map(|r| format!("  * {}", r))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "deleting {}: the resource group still contains {} resource(s):\n\n{}\n\n\
         Remove these resources first, or set `prevent_deletion_if_contains_resources` \
         to false in the `resource_group` features block to delete them along with the group.",
        id,
        nested.len(),
        listing
    )
}
