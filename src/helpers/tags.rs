//! Resource tags

use crate::plugin::schema::{AttrType, Attribute};
use anyhow::Result;
use serde_json::{Map, Value};

const MAX_TAGS: usize = 50;
const MAX_KEY_LENGTH: usize = 512;
const MAX_VALUE_LENGTH: usize = 256;

pub fn schema() -> Attribute {
    Attribute::optional(AttrType::map(AttrType::String))
}

pub fn schema_computed() -> Attribute {
    Attribute::computed(AttrType::map(AttrType::String))
}

pub fn schema_force_new() -> Attribute {
    schema().force_new()
}

/// Check the limits the API enforces on tags
pub fn validate(tags: &Map<String, Value>) -> Result<()> {
    if tags.len() > MAX_TAGS {
        anyhow::bail!("a maximum of {} tags can be applied to each resource", MAX_TAGS);
    }

    for (key, value) in tags {
        if key.chars().count() > MAX_KEY_LENGTH {
            anyhow::bail!("the maximum length for a tag key is {} characters: {:?}", MAX_KEY_LENGTH, key);
        }
        let Some(value) = value.as_str() else {
            anyhow::bail!("the value of tag {:?} must be a string", key);
        };
        if value.chars().count() > MAX_VALUE_LENGTH {
            anyhow::bail!(
                "the maximum length for a tag value is {} characters: {:?}",
                MAX_VALUE_LENGTH,
                key
            );
        }
    }

    Ok(())
}

/// Tags for a request body
pub fn expand(tags: &Map<String, Value>) -> Result<Value> {
    validate(tags)?;
    Ok(Value::Object(tags.clone()))
}

/// Tags of an API response; missing tags become an empty map
pub fn flatten(value: Option<&Value>) -> Value {
    let tags: Map<String, Value> = value
        .and_then(|v| v.as_object())
        .map(|m| {
            m.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(_) => v.clone(),
                        Value::Null => Value::String(String::new()),
                        other => Value::String(other.to_string()),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Object(tags)
}
