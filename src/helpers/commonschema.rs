//! Attributes most resources share

use super::location;
use crate::plugin::schema::{AttrType, Attribute};

pub fn name() -> Attribute {
    Attribute::required(AttrType::String).force_new()
}

pub fn resource_group_name() -> Attribute {
    Attribute::required(AttrType::String)
        .force_new()
        .description("Name of the resource group the resource lives in")
}

/// Data sources look the group up by name
pub fn resource_group_name_for_data_source() -> Attribute {
    Attribute::required(AttrType::String)
}

pub fn location() -> Attribute {
    Attribute::required(AttrType::String)
        .force_new()
        .state_func(location::normalize)
}

pub fn location_computed() -> Attribute {
    Attribute::computed(AttrType::String)
}

pub fn zones_optional_force_new() -> Attribute {
    Attribute::optional(AttrType::set(AttrType::String)).force_new()
}

pub fn zones_computed() -> Attribute {
    Attribute::computed(AttrType::list(AttrType::String))
}
