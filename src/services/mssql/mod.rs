//! Microsoft.Sql

mod mssql_database_resource;

pub use mssql_database_resource::MsSqlDatabaseResource;

use crate::plugin::resource::Resource;

pub const API_VERSION: &str = "2021-11-01";

/// Lock kind for a database, keyed by its full id
pub const DATABASE_RESOURCE_NAME: &str = "azurerm_mssql_database";

pub fn resources() -> Vec<Box<dyn Resource>> {
    vec![Box::new(MsSqlDatabaseResource)]
}
