//! Plugin framework
//!
//! The pieces every resource is built from: schemas, the [`data::ResourceData`]
//! state bag, the [`resource::Resource`] traits, status waiting, named locks
//! and planning.

pub mod data;
pub mod locks;
pub mod plan;
pub mod resource;
pub mod schema;
pub mod wait;

pub use data::{ResourceData, ResourceState};
pub use resource::{DataSource, Operation, Resource, Timeouts};
pub use schema::{AttrType, Attribute, Schema};
