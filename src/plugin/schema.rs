//! Resource Schemas
//!
//! Declarative description of the attributes a resource or data source
//! accepts and exposes, plus configuration validation and defaults.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute value type
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum AttrType {
    String,
    Int,
    Float,
    Bool,
    List(Box<AttrType>),
    /// Unordered collection, compared without regard to order
    Set(Box<AttrType>),
    Map(Box<AttrType>),
    /// Nested object with its own schema
    Block(Box<Schema>),
}

impl AttrType {
    pub fn list(element: AttrType) -> Self {
        AttrType::List(Box::new(element))
    }

    pub fn set(element: AttrType) -> Self {
        AttrType::Set(Box::new(element))
    }

    pub fn map(element: AttrType) -> Self {
        AttrType::Map(Box::new(element))
    }

    /// Repeated nested block (`List(Block(schema))`)
    pub fn blocks(schema: Schema) -> Self {
        AttrType::List(Box::new(AttrType::Block(Box::new(schema))))
    }

    /// Repeated nested block without ordering (`Set(Block(schema))`)
    pub fn block_set(schema: Schema) -> Self {
        AttrType::Set(Box::new(AttrType::Block(Box::new(schema))))
    }

    fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Int => "integer",
            AttrType::Float => "number",
            AttrType::Bool => "bool",
            AttrType::List(_) => "list",
            AttrType::Set(_) => "set",
            AttrType::Map(_) => "map",
            AttrType::Block(_) => "block",
        }
    }
}

/// A single schema attribute
#[derive(Debug, Clone, Serialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: AttrType,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub computed: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub force_new: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Canonical form of a string value, applied to configuration before use
    #[serde(skip)]
    pub state_func: Option<fn(&str) -> String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Attribute {
    fn base(ty: AttrType) -> Self {
        Self {
            ty,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            max_items: None,
            min_items: None,
            description: None,
            state_func: None,
        }
    }

    pub fn required(ty: AttrType) -> Self {
        Self {
            required: true,
            ..Self::base(ty)
        }
    }

    pub fn optional(ty: AttrType) -> Self {
        Self {
            optional: true,
            ..Self::base(ty)
        }
    }

    /// Set only by the provider
    pub fn computed(ty: AttrType) -> Self {
        Self {
            computed: true,
            ..Self::base(ty)
        }
    }

    /// Settable, but filled in from the API when left out
    pub fn optional_computed(ty: AttrType) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::base(ty)
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn state_func(mut self, f: fn(&str) -> String) -> Self {
        self.state_func = Some(f);
        self
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    /// Only the provider can set this attribute
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Attributes of a resource, data source or nested block
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub version: u32,
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Add an attribute (builder style)
    pub fn with(mut self, name: &str, attribute: Attribute) -> Self {
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

/// All problems found while validating a configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration:\n  {}", .0.join("\n  "))]
pub struct ValidationErrors(pub Vec<String>);

/// Attribute names the framework handles itself
const RESERVED_ATTRIBUTES: &[&str] = &["timeouts"];

// =============================================================================
// Validation
// =============================================================================

/// Validate a configuration object against a schema
pub fn validate_config(schema: &Schema, config: &Value) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    match config {
        Value::Null => validate_object(schema, &Map::new(), "", true, &mut errors),
        Value::Object(obj) => validate_object(schema, obj, "", true, &mut errors),
        other => errors.push(format!(
            "configuration must be an object, got {}",
            json_kind(other)
        )),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn validate_object(
    schema: &Schema,
    obj: &Map<String, Value>,
    path: &str,
    top_level: bool,
    errors: &mut Vec<String>,
) {
    for key in obj.keys() {
        if top_level && RESERVED_ATTRIBUTES.contains(&key.as_str()) {
            continue;
        }
        if !schema.attributes.contains_key(key) {
            errors.push(format!("{}: unsupported argument", join_path(path, key)));
        }
    }

    for (name, attribute) in &schema.attributes {
        let attr_path = join_path(path, name);
        match obj.get(name).filter(|v| !v.is_null()) {
            None if attribute.required => {
                errors.push(format!("{}: required argument is missing", attr_path));
            }
            None => {}
            Some(_) if attribute.is_computed_only() => {
                errors.push(format!(
                    "{}: cannot be set, the value is computed by the provider",
                    attr_path
                ));
            }
            Some(value) => {
                check_type(&attribute.ty, value, &attr_path, errors);
                check_item_bounds(attribute, value, &attr_path, errors);
            }
        }
    }
}

fn check_type(ty: &AttrType, value: &Value, path: &str, errors: &mut Vec<String>) {
    let ok = match (ty, value) {
        (AttrType::String, Value::String(_)) => true,
        (AttrType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (AttrType::Float, Value::Number(_)) => true,
        (AttrType::Bool, Value::Bool(_)) => true,
        (AttrType::List(element) | AttrType::Set(element), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                check_type(element, item, &format!("{}.{}", path, i), errors);
            }
            true
        }
        (AttrType::Map(element), Value::Object(entries)) => {
            for (key, item) in entries {
                check_type(element, item, &format!("{}.{}", path, key), errors);
            }
            true
        }
        (AttrType::Block(schema), Value::Object(obj)) => {
            validate_object(schema, obj, path, false, errors);
            true
        }
        _ => false,
    };

    if !ok {
        errors.push(format!(
            "{}: expected {}, got {}",
            path,
            ty.name(),
            json_kind(value)
        ));
    }
}

fn check_item_bounds(attribute: &Attribute, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(items) = value.as_array() else {
        return;
    };
    if let Some(min) = attribute.min_items {
        if items.len() < min {
            errors.push(format!(
                "{}: at least {} item(s) required, got {}",
                path,
                min,
                items.len()
            ));
        }
    }
    if let Some(max) = attribute.max_items {
        if items.len() > max {
            errors.push(format!(
                "{}: at most {} item(s) allowed, got {}",
                path,
                max,
                items.len()
            ));
        }
    }
}

fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Defaults and comparison
// =============================================================================

/// Fill in schema defaults for absent attributes and canonicalize values
/// that have a state function, including inside nested blocks
pub fn apply_defaults(schema: &Schema, config: &mut Value) {
    let Some(obj) = config.as_object_mut() else {
        return;
    };

    for (name, attribute) in &schema.attributes {
        let absent = obj.get(name).map_or(true, Value::is_null);
        if absent {
            if let Some(default) = &attribute.default {
                obj.insert(name.clone(), default.clone());
            }
            continue;
        }

        if let Some(value) = obj.get_mut(name) {
            if let Some(f) = attribute.state_func {
                if let Some(canonical) = value.as_str().map(f) {
                    *value = Value::String(canonical);
                }
            }
            apply_nested_defaults(&attribute.ty, value);
        }
    }
}

fn apply_nested_defaults(ty: &AttrType, value: &mut Value) {
    match ty {
        AttrType::Block(schema) => apply_defaults(schema, value),
        AttrType::List(element) | AttrType::Set(element) => {
            if let AttrType::Block(schema) = element.as_ref() {
                if let Some(items) = value.as_array_mut() {
                    for item in items {
                        apply_defaults(schema, item);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Null and the zero value of every JSON type
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Whether a configured value matches a stored one
///
/// `desired` is the configuration side: computed attributes it leaves out
/// inside nested blocks are not compared. Zero values equal null, sets ignore
/// order.
pub fn equivalent(ty: &AttrType, desired: &Value, current: &Value) -> bool {
    if is_zero(desired) && is_zero(current) {
        return true;
    }

    match ty {
        AttrType::String | AttrType::Bool => desired == current,
        AttrType::Int | AttrType::Float => match (desired.as_f64(), current.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => desired == current,
        },
        AttrType::List(element) => {
            let (Some(a), Some(b)) = (desired.as_array(), current.as_array()) else {
                return false;
            };
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equivalent(element, x, y))
        }
        AttrType::Set(element) => {
            let (Some(a), Some(b)) = (desired.as_array(), current.as_array()) else {
                return false;
            };
            set_equivalent(element, a, b)
        }
        AttrType::Map(element) => {
            let (Some(a), Some(b)) = (desired.as_object(), current.as_object()) else {
                return false;
            };
            a.keys().chain(b.keys()).all(|key| {
                equivalent(
                    element,
                    a.get(key).unwrap_or(&Value::Null),
                    b.get(key).unwrap_or(&Value::Null),
                )
            })
        }
        AttrType::Block(schema) => {
            let (Some(a), Some(b)) = (desired.as_object(), current.as_object()) else {
                return false;
            };
            block_equivalent(schema, a, b)
        }
    }
}

fn block_equivalent(schema: &Schema, desired: &Map<String, Value>, current: &Map<String, Value>) -> bool {
    schema.attributes.iter().all(|(name, attribute)| {
        let want = desired.get(name).unwrap_or(&Value::Null);
        if attribute.computed && want.is_null() {
            return true;
        }
        equivalent(&attribute.ty, want, current.get(name).unwrap_or(&Value::Null))
    })
}

/// Every desired element pairs with a distinct current element
fn set_equivalent(element: &AttrType, desired: &[Value], current: &[Value]) -> bool {
    if desired.len() != current.len() {
        return false;
    }

    let mut used = vec![false; current.len()];
    desired.iter().all(|want| {
        let matched = current
            .iter()
            .enumerate()
            .find(|(i, have)| !used[*i] && equivalent(element, want, have))
            .map(|(i, _)| i);
        match matched {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}
