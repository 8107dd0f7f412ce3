//! Microsoft.Cache

mod configuration;
mod redis_cache_resource;

pub use redis_cache_resource::RedisCacheResource;

use crate::plugin::resource::Resource;

pub const API_VERSION: &str = "2023-04-01";

pub fn resources() -> Vec<Box<dyn Resource>> {
    vec![Box::new(RedisCacheResource)]
}
