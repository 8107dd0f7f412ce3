//! Microsoft.Logic

mod logic_app_workflow_resource;
mod parameters;

pub use logic_app_workflow_resource::LogicAppWorkflowResource;

use crate::plugin::resource::Resource;

pub const API_VERSION: &str = "2019-05-01";

/// Lock kind shared by a workflow and everything nested below it
pub const LOGIC_APP_RESOURCE_NAME: &str = "azurerm_logic_app";

pub fn resources() -> Vec<Box<dyn Resource>> {
    vec![Box::new(LogicAppWorkflowResource)]
}
