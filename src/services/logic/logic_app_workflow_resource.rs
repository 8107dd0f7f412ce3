use super::parameters::{
    expand_parameters, expand_workflow_parameters, flatten_parameters, flatten_workflow_parameters,
};
use super::{API_VERSION, LOGIC_APP_RESOURCE_NAME};
use crate::arm::client::was_not_found;
use crate::arm::ids::WorkflowId;
use crate::helpers::{commonschema, location, tags};
use crate::plugin::data::{list_field, str_field, ResourceData};
use crate::plugin::resource::{import_as_exists_error, Resource, Timeouts};
use crate::plugin::schema::{AttrType, Attribute, Schema};
use crate::provider::ProviderMeta;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

const DEFAULT_WORKFLOW_SCHEMA: &str =
    "https://schema.management.azure.com/providers/Microsoft.Logic/schemas/2016-06-01/workflowdefinition.json#";
const DEFAULT_WORKFLOW_VERSION: &str = "1.0.0.0";

/// (block name, API key) of each access control policy
const ACCESS_CONTROL_POLICIES: [(&str, &str); 4] = [
    ("action", "actions"),
    ("content", "contents"),
    ("trigger", "triggers"),
    ("workflow_management", "workflowManagement"),
];

pub struct LogicAppWorkflowResource;

fn caller_ip_policy_schema() -> Schema {
    Schema::new().with(
        "allowed_caller_ip_address_range",
        Attribute::required(AttrType::set(AttrType::String)),
    )
}

fn trigger_policy_schema() -> Schema {
    let claim = Schema::new()
        .with("name", Attribute::required(AttrType::String))
        .with("value", Attribute::required(AttrType::String));
    let open_authentication_policy = Schema::new()
        .with("name", Attribute::required(AttrType::String))
        .with("claim", Attribute::required(AttrType::block_set(claim)));

    caller_ip_policy_schema().with(
        "open_authentication_policy",
        Attribute::optional(AttrType::block_set(open_authentication_policy)),
    )
}

fn access_control_schema() -> Schema {
    let policy = |schema: Schema| Attribute::optional(AttrType::blocks(schema)).max_items(1);
    Schema::new()
        .with("action", policy(caller_ip_policy_schema()))
        .with("content", policy(caller_ip_policy_schema()))
        .with("trigger", policy(trigger_policy_schema()))
        .with("workflow_management", policy(caller_ip_policy_schema()))
}

#[async_trait]
impl Resource for LogicAppWorkflowResource {
    fn type_name(&self) -> &'static str {
        "azurerm_logic_app_workflow"
    }

    fn schema(&self) -> Schema {
        let addresses = || Attribute::computed(AttrType::list(AttrType::String));
        Schema::new()
            .with("name", commonschema::name())
            .with("location", commonschema::location())
            .with("resource_group_name", commonschema::resource_group_name())
            .with(
                "integration_service_environment_id",
                Attribute::optional(AttrType::String).force_new(),
            )
            .with(
                "access_control",
                Attribute::optional(AttrType::blocks(access_control_schema())).max_items(1),
            )
            .with("logic_app_integration_account_id", Attribute::optional(AttrType::String))
            .with("parameters", Attribute::optional(AttrType::map(AttrType::String)))
            .with("enabled", Attribute::optional(AttrType::Bool).default_value(true))
            .with(
                "workflow_schema",
                Attribute::optional(AttrType::String)
                    .force_new()
                    .default_value(DEFAULT_WORKFLOW_SCHEMA),
            )
            .with(
                "workflow_version",
                Attribute::optional(AttrType::String)
                    .force_new()
                    .default_value(DEFAULT_WORKFLOW_VERSION),
            )
            .with("workflow_parameters", Attribute::optional(AttrType::map(AttrType::String)))
            .with("access_endpoint", Attribute::computed(AttrType::String))
            .with("connector_endpoint_ip_addresses", addresses())
            .with("connector_outbound_ip_addresses", addresses())
            .with("workflow_endpoint_ip_addresses", addresses())
            .with("workflow_outbound_ip_addresses", addresses())
            .with("tags", tags::schema())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        WorkflowId::parse(id)?;
        Ok(())
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = WorkflowId::new(
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

        let workflow_parameters = expand_workflow_parameters(&d.get_map("workflow_parameters"))
            .with_context(|| format!("expanding `workflow_parameters` for {}", id))?;
        let parameters = expand_parameters(&d.get_map("parameters"), &workflow_parameters)
            .with_context(|| format!("expanding `parameters` for {}", id))?;

        let definition = json!({
            "$schema": d.get_str("workflow_schema"),
            "contentVersion": d.get_str("workflow_version"),
            "actions": {},
            "triggers": {},
            "parameters": workflow_parameters,
        });
        let mut properties = json!({
            "definition": definition,
            "parameters": parameters,
            "state": workflow_state(d.get_bool("enabled")),
        });
        if let Some(access_control) = expand_access_control(d.get_list("access_control")) {
            properties["accessControl"] = access_control;
        }
        if let Some(ise) = d.get_ok("integration_service_environment_id") {
            properties["integrationServiceEnvironment"] = json!({ "id": ise });
        }
        if let Some(account) = d.get_ok("logic_app_integration_account_id") {
            properties["integrationAccount"] = json!({ "id": account });
        }

        let body = json!({
            "location": d.get_str("location"),
            "properties": properties,
            "tags": tags::expand(&d.get_map("tags"))?,
        });

        meta.client
            .put(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("creating {}", id))?;

        d.set_id(id.id());
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = WorkflowId::parse(d.id())?;

        let Some(workflow) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        d.set("name", id.workflow_name.as_str());
        d.set("resource_group_name", id.resource_group_name.as_str());
        d.set("location", location::normalize_nilable(workflow.get("location")));

        let props = workflow.get("properties").unwrap_or(&Value::Null);
        let definition = props.get("definition").unwrap_or(&Value::Null);
        let definitions = definition.get("parameters").unwrap_or(&Value::Null);

        let prior_parameters = d.get_map("parameters");
        let parameters = flatten_parameters(props.get("parameters"), definitions, &prior_parameters)
            .with_context(|| format!("flattening `parameters` for {}", id))?;
        d.set("parameters", parameters);
        d.set(
            "workflow_parameters",
            flatten_workflow_parameters(definition.get("parameters"))
                .with_context(|| format!("flattening `workflow_parameters` for {}", id))?,
        );
        d.set("workflow_schema", str_field(definition, "$schema"));
        d.set("workflow_version", str_field(definition, "contentVersion"));

        d.set("access_endpoint", str_field(props, "accessEndpoint"));
        d.set("enabled", str_field(props, "state").eq_ignore_ascii_case("Enabled"));
        d.set("access_control", flatten_access_control(props.get("accessControl")));
        d.set(
            "integration_service_environment_id",
            props.pointer("/integrationServiceEnvironment/id").cloned().unwrap_or(Value::Null),
        );
        d.set(
            "logic_app_integration_account_id",
            props.pointer("/integrationAccount/id").cloned().unwrap_or(Value::Null),
        );

        let endpoints = props.get("endpointsConfiguration").unwrap_or(&Value::Null);
        for (attribute, pointer) in [
            ("connector_endpoint_ip_addresses", "/connector/accessEndpointIpAddresses"),
            ("connector_outbound_ip_addresses", "/connector/outgoingIpAddresses"),
            ("workflow_endpoint_ip_addresses", "/workflow/accessEndpointIpAddresses"),
            ("workflow_outbound_ip_addresses", "/workflow/outgoingIpAddresses"),
        ] {
            d.set(attribute, flatten_ip_addresses(endpoints.pointer(pointer)));
        }

        d.set("tags", tags::flatten(workflow.get("tags")));
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = WorkflowId::parse(d.id())?;

        let _lock = meta.locks.by_name(&id.workflow_name, LOGIC_APP_RESOURCE_NAME).await;

        let Some(mut workflow) = meta
            .client
            .get_if_exists(&id.id(), API_VERSION)
            .await
            .with_context(|| format!("retrieving {}", id))?
        else {
            tracing::info!("{} was not found - removing from state", id);
            d.set_id("");
            return Ok(());
        };

        let workflow_parameters = expand_workflow_parameters(&d.get_map("workflow_parameters"))
            .with_context(|| format!("expanding `workflow_parameters` for {}", id))?;
        let parameters = expand_parameters(&d.get_map("parameters"), &workflow_parameters)
            .with_context(|| format!("expanding `parameters` for {}", id))?;

        let properties = workflow
            .as_object_mut()
            .context("expected the API to return an object")?
            .entry("properties")
            .or_insert_with(|| json!({}));
        if !properties.is_object() {
            anyhow::bail!("expected `properties` of {} to be an object", id);
        }
        // actions and triggers belong to their own resources and are kept as returned
        if !properties.get("definition").is_some_and(Value::is_object) {
            properties["definition"] = json!({});
        }
        properties["definition"]["parameters"] = workflow_parameters;
        properties["parameters"] = parameters;
        properties["state"] = json!(workflow_state(d.get_bool("enabled")));
        properties["accessControl"] =
            expand_access_control(d.get_list("access_control")).unwrap_or_else(|| json!({}));
        match d.get_ok("logic_app_integration_account_id") {
            Some(account) => properties["integrationAccount"] = json!({ "id": account }),
            None => {
                if let Some(props) = properties.as_object_mut() {
                    props.remove("integrationAccount");
                }
            }
        }

        let body = json!({
            "location": d.get_str("location"),
            "properties": properties,
            "tags": tags::expand(&d.get_map("tags"))?,
        });

        meta.client
            .put(&id.id(), API_VERSION, &body)
            .await
            .with_context(|| format!("updating {}", id))?;

        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<()> {
        let id = WorkflowId::parse(d.id())?;

        let _lock = meta.locks.by_name(&id.workflow_name, LOGIC_APP_RESOURCE_NAME).await;

        match meta.client.delete(&id.id(), API_VERSION).await {
            Ok(()) => Ok(()),
            Err(e) if was_not_found(&e) => Ok(()),
            Err(e) => Err(e.context(format!("deleting {}", id))),
        }
    }
}

fn workflow_state(enabled: bool) -> &'static str {
    if enabled {
        "Enabled"
    } else {
        "Disabled"
    }
}

fn expand_access_control(input: &[Value]) -> Option<Value> {
    let block = input.first().filter(|b| b.is_object())?;
    let mut output = Map::new();
    for (name, key) in ACCESS_CONTROL_POLICIES {
        if let Some(policy) = list_field(block, name).first() {
            output.insert(key.to_string(), expand_access_control_policy(policy));
        }
    }
    Some(Value::Object(output))
}

fn expand_access_control_policy(policy: &Value) -> Value {
    let ranges: Vec<Value> = list_field(policy, "allowed_caller_ip_address_range")
        .iter()
        .filter_map(|r| r.as_str())
        .map(|r| json!({ "addressRange": r }))
        .collect();
    let mut output = json!({ "allowedCallerIpAddresses": ranges });

    let open_authentication = list_field(policy, "open_authentication_policy");
    if !open_authentication.is_empty() {
        let mut policies = Map::new();
        for item in open_authentication {
            let claims: Vec<Value> = list_field(item, "claim")
                .iter()
                .map(|c| json!({ "name": str_field(c, "name"), "value": str_field(c, "value") }))
                .collect();
            policies.insert(
                str_field(item, "name").to_string(),
                json!({ "type": "AAD", "claims": claims }),
            );
        }
        output["openAuthenticationPolicies"] = json!({ "policies": policies });
    }
    output
}

fn flatten_access_control(input: Option<&Value>) -> Vec<Value> {
    let Some(access_control) = input.filter(|v| v.as_object().is_some_and(|o| !o.is_empty())) else {
        return Vec::new();
    };

    let mut block = Map::new();
    for (name, key) in ACCESS_CONTROL_POLICIES {
        let policies = match access_control.get(key) {
            Some(policy) => vec![flatten_access_control_policy(policy, name == "trigger")],
            None => Vec::new(),
        };
        block.insert(name.to_string(), Value::Array(policies));
    }
    vec![Value::Object(block)]
}

fn flatten_access_control_policy(policy: &Value, with_open_authentication: bool) -> Value {
    let ranges: Vec<Value> = list_field(policy, "allowedCallerIpAddresses")
        .iter()
        .filter_map(|r| r.get("addressRange").cloned())
        .collect();
    let mut output = json!({ "allowed_caller_ip_address_range": ranges });

    if with_open_authentication {
        let policies: Vec<Value> = policy
            .pointer("/openAuthenticationPolicies/policies")
            .and_then(|p| p.as_object())
            .into_iter()
            .flatten()
            .map(|(name, p)| {
                let claims: Vec<Value> = list_field(p, "claims")
                    .iter()
                    .map(|c| json!({ "name": str_field(c, "name"), "value": str_field(c, "value") }))
                    .collect();
                json!({ "name": name, "claim": claims })
            })
            .collect();
        output["open_authentication_policy"] = Value::Array(policies);
    }
    output
}

fn flatten_ip_addresses(input: Option<&Value>) -> Vec<Value> {
    input
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("address").cloned())
        .collect()
}
