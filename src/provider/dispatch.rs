//! Request Dispatch
//!
//! Maps host requests (schema, validate, plan, apply, read, delete, import,
//! data source reads) onto resource handlers, and serves them as JSON lines.

use super::registry;
use super::ProviderMeta;
use crate::arm::http::format_arm_error;
use crate::plugin::data::{ResourceData, ResourceState};
use crate::plugin::plan::{plan, PlanAction, PlannedChange};
use crate::plugin::resource::{DataSource, Operation, Resource, Timeouts};
use crate::plugin::schema::{apply_defaults, validate_config, Schema};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// A host request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Request {
    GetSchema,
    Validate {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        data_source: bool,
        #[serde(default)]
        config: Value,
    },
    Plan {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        config: Option<Value>,
        #[serde(default)]
        prior: Option<ResourceState>,
    },
    Apply {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        config: Option<Value>,
        #[serde(default)]
        prior: Option<ResourceState>,
    },
    Read {
        #[serde(rename = "type")]
        type_name: String,
        state: ResourceState,
    },
    Delete {
        #[serde(rename = "type")]
        type_name: String,
        state: ResourceState,
    },
    Import {
        #[serde(rename = "type")]
        type_name: String,
        id: String,
    },
    ReadDataSource {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        config: Value,
    },
}

/// Reply to a [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Schema { schema: Value },
    Valid,
    Plan { plan: PlannedChange },
    /// `state: null` means the object is gone
    State { state: Option<ResourceState> },
    Deleted,
    Error { message: String },
}

/// Handle one request; failures become [`Response::Error`]
///
/// `meta` may be absent for requests that never reach the API.
pub async fn invoke(meta: Option<&ProviderMeta>, request: Request) -> Response {
    match handle(meta, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Request failed: {:#}", e);
            Response::Error {
                message: format_arm_error(&e),
            }
        }
    }
}

async fn handle(meta: Option<&ProviderMeta>, request: Request) -> Result<Response> {
    match request {
        Request::GetSchema => Ok(Response::Schema {
            schema: registry::provider_schema(),
        }),
        Request::Validate {
            type_name,
            data_source,
            config,
        } => {
            if data_source {
                let ds = find_data_source(&type_name)?;
                prepare_config(&ds.schema(), Some(config), ds.timeouts())?;
            } else {
                let resource = find_resource(&type_name)?;
                prepare_config(&resource.schema(), Some(config), resource.timeouts())?;
            }
            Ok(Response::Valid)
        }
        Request::Plan {
            type_name,
            config,
            prior,
        } => {
            let resource = find_resource(&type_name)?;
            let schema = resource.schema();
            let (config, _) = prepare_config(&schema, config, resource.timeouts())?;
            Ok(Response::Plan {
                plan: plan_resource(resource, &schema, config.as_ref(), prior.as_ref()),
            })
        }
        Request::Apply {
            type_name,
            config,
            prior,
        } => {
            let resource = find_resource(&type_name)?;
            let state = apply(require(meta)?, resource, config, prior).await?;
            Ok(Response::State { state })
        }
        Request::Read { type_name, state } => {
            let resource = find_resource(&type_name)?;
            let state = read(require(meta)?, resource, &state).await?;
            Ok(Response::State { state })
        }
        Request::Delete { type_name, state } => {
            let resource = find_resource(&type_name)?;
            delete(require(meta)?, resource, &state, resource.timeouts()).await?;
            Ok(Response::Deleted)
        }
        Request::Import { type_name, id } => {
            let resource = find_resource(&type_name)?;
            let state = import(require(meta)?, resource, &id).await?;
            Ok(Response::State { state: Some(state) })
        }
        Request::ReadDataSource { type_name, config } => {
            let ds = find_data_source(&type_name)?;
            let state = read_data_source(require(meta)?, ds, config).await?;
            Ok(Response::State { state: Some(state) })
        }
    }
}

fn require(meta: Option<&ProviderMeta>) -> Result<&ProviderMeta> {
    meta.context("the provider is not configured: credentials and a subscription are required")
}

fn find_resource(type_name: &str) -> Result<&'static dyn Resource> {
    registry::get_resource(type_name)
        .with_context(|| format!("unknown resource type {:?}", type_name))
}

fn find_data_source(type_name: &str) -> Result<&'static dyn DataSource> {
    registry::get_data_source(type_name)
        .with_context(|| format!("unknown data source type {:?}", type_name))
}

/// Apply defaults, validate, and resolve the `timeouts` block
fn prepare_config(
    schema: &Schema,
    config: Option<Value>,
    timeouts: Timeouts,
) -> Result<(Option<Value>, Timeouts)> {
    let Some(mut config) = config.filter(|c| !c.is_null()) else {
        return Ok((None, timeouts));
    };

    apply_defaults(schema, &mut config);
    validate_config(schema, &config)?;
    let timeouts = timeouts.with_overrides(config.get("timeouts"))?;
    Ok((Some(config), timeouts))
}

/// Plan from the schema, then let the resource force replacements it alone can judge
fn plan_resource(
    resource: &dyn Resource,
    schema: &Schema,
    config: Option<&Value>,
    prior: Option<&ResourceState>,
) -> PlannedChange {
    let mut change = plan(schema, config, prior);
    if let (Some(config), Some(prior)) = (config, prior) {
        change.force_new(&resource.force_new_if_change(config, prior));
    }
    change
}

/// Run a handler under its operation time limit
async fn run<F>(operation: Operation, type_name: &str, limit: Duration, handler: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tracing::info!("{} {} (timeout {:?})", operation, type_name, limit);
    match tokio::time::timeout(limit, handler).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{} of {} timed out after {:?}",
            operation,
            type_name,
            limit
        )),
    }
}

// =============================================================================
// Resource lifecycle
// =============================================================================

/// Bring a resource in line with `config` (absent config deletes it)
pub async fn apply(
    meta: &ProviderMeta,
    resource: &dyn Resource,
    config: Option<Value>,
    prior: Option<ResourceState>,
) -> Result<Option<ResourceState>> {
    let schema = resource.schema();
    let (config, timeouts) = prepare_config(&schema, config, resource.timeouts())?;
    let change = plan_resource(resource, &schema, config.as_ref(), prior.as_ref());
    tracing::debug!("Planned {:?} for {}: {:?}", change.action, resource.type_name(), change.changed);

    match (change.action, config, prior) {
        (PlanAction::NoOp, _, prior) => Ok(prior),
        (PlanAction::Delete, _, Some(prior)) => {
            delete(meta, resource, &prior, timeouts).await?;
            Ok(None)
        }
        (PlanAction::Create, Some(config), _) => {
            create(meta, resource, schema, config, timeouts).await.map(Some)
        }
        (PlanAction::Replace, Some(config), Some(prior)) => {
            tracing::info!(
                "Replacing {} {}: {:?} cannot be updated in place",
                resource.type_name(),
                prior.id,
                change.requires_replace
            );
            delete(meta, resource, &prior, timeouts).await?;
            create(meta, resource, schema, config, timeouts).await.map(Some)
        }
        (PlanAction::Update, Some(config), Some(prior)) => {
            let mut d = ResourceData::for_update(schema, config, &prior).with_timeouts(timeouts);
            d.begin(Operation::Update);
            let limit = d.timeout_for(Operation::Update);
            run(Operation::Update, resource.type_name(), limit, resource.update(meta, &mut d)).await?;
            Ok(d.into_state())
        }
        (action, _, _) => Err(anyhow::anyhow!(
            "cannot apply planned action {:?} to {}",
            action,
            resource.type_name()
        )),
    }
}

async fn create(
    meta: &ProviderMeta,
    resource: &dyn Resource,
    schema: Schema,
    config: Value,
    timeouts: Timeouts,
) -> Result<ResourceState> {
    let mut d = ResourceData::for_create(schema, config).with_timeouts(timeouts);
    d.begin(Operation::Create);
    let limit = d.timeout_for(Operation::Create);
    run(Operation::Create, resource.type_name(), limit, resource.create(meta, &mut d)).await?;

    d.into_state().with_context(|| {
        format!(
            "creating {} finished without an id: the object was not found after creation",
            resource.type_name()
        )
    })
}

/// Refresh a resource; `None` when it no longer exists
pub async fn read(
    meta: &ProviderMeta,
    resource: &dyn Resource,
    state: &ResourceState,
) -> Result<Option<ResourceState>> {
    let mut d = ResourceData::from_state(resource.schema(), state).with_timeouts(resource.timeouts());
    d.begin(Operation::Read);
    let limit = d.timeout_for(Operation::Read);
    run(Operation::Read, resource.type_name(), limit, resource.read(meta, &mut d)).await?;

    let refreshed = d.into_state();
    if refreshed.is_none() {
        tracing::info!("{} {} no longer exists, removing from state", resource.type_name(), state.id);
    }
    Ok(refreshed)
}

pub async fn delete(
    meta: &ProviderMeta,
    resource: &dyn Resource,
    state: &ResourceState,
    timeouts: Timeouts,
) -> Result<()> {
    let mut d = ResourceData::from_state(resource.schema(), state).with_timeouts(timeouts);
    d.begin(Operation::Delete);
    let limit = d.timeout_for(Operation::Delete);
    run(Operation::Delete, resource.type_name(), limit, resource.delete(meta, &mut d)).await
}

/// Adopt an existing object by id
pub async fn import(meta: &ProviderMeta, resource: &dyn Resource, id: &str) -> Result<ResourceState> {
    resource
        .validate_id(id)
        .with_context(|| format!("importing {} {:?}", resource.type_name(), id))?;

    let mut d = ResourceData::for_import(resource.schema(), id).with_timeouts(resource.timeouts());
    d.begin(Operation::Read);
    let limit = d.timeout_for(Operation::Read);
    run(Operation::Read, resource.type_name(), limit, resource.read(meta, &mut d)).await?;

    d.into_state().with_context(|| {
        format!(
            "cannot import non-existent remote object: {} {:?}",
            resource.type_name(),
            id
        )
    })
}

pub async fn read_data_source(
    meta: &ProviderMeta,
    data_source: &dyn DataSource,
    config: Value,
) -> Result<ResourceState> {
    let schema = data_source.schema();
    let (config, timeouts) = prepare_config(&schema, Some(config), data_source.timeouts())?;

    let mut d = ResourceData::for_data_source(schema, config.unwrap_or(Value::Null))
        .with_timeouts(timeouts);
    d.begin(Operation::Read);
    let limit = d.timeout_for(Operation::Read);
    run(Operation::Read, data_source.type_name(), limit, data_source.read(meta, &mut d)).await?;

    d.into_state()
        .with_context(|| format!("reading {} returned no object", data_source.type_name()))
}

// =============================================================================
// JSON lines server
// =============================================================================

/// Serve requests from `reader`, one JSON document per line, until EOF
pub async fn serve<R, W>(meta: Option<&ProviderMeta>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut handled: u64 = 0;

    while let Some(line) = lines.next_line().await.context("reading request")? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => invoke(meta, request).await,
            Err(e) => Response::Error {
                message: format!("invalid request: {}", e),
            },
        };
        handled += 1;

        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await.context("writing response")?;
        writer.flush().await?;
    }

    tracing::info!("Input closed after {} requests", handled);
    Ok(())
}
