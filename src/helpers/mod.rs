//! Schema and value helpers shared by the service modules

pub mod commonschema;
pub mod location;
pub mod tags;
