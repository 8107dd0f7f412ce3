//! Microsoft.Resources

mod resource_group_data_source;
mod resource_group_resource;

pub use resource_group_data_source::ResourceGroupDataSource;
pub use resource_group_resource::ResourceGroupResource;

use crate::plugin::resource::{DataSource, Resource};

pub const API_VERSION: &str = "2022-09-01";

pub fn resources() -> Vec<Box<dyn Resource>> {
    vec![Box::new(ResourceGroupResource)]
}

pub fn data_sources() -> Vec<Box<dyn DataSource>> {
    vec![Box::new(ResourceGroupDataSource)]
}
