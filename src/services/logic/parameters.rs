//! Workflow parameters
//!
//! Users supply every parameter value as a string. The API wants typed
//! values, so the declared type in the workflow definition decides how a
//! string is parsed on the way out and rendered on the way back.

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParameterType {
    Array,
    Bool,
    Float,
    Int,
    Object,
    SecureObject,
    SecureString,
    String,
}

impl ParameterType {
    fn parse(raw: &str) -> Result<Self> {
        let ty = match raw.to_ascii_lowercase().as_str() {
            "array" => Self::Array,
            "bool" => Self::Bool,
            "float" => Self::Float,
            "int" => Self::Int,
            "object" => Self::Object,
            "secureobject" => Self::SecureObject,
            "securestring" => Self::SecureString,
            "string" => Self::String,
            other => bail!("unsupported parameter type {:?}", other),
        };
        Ok(ty)
    }

    fn is_secure(self) -> bool {
        matches!(self, Self::SecureObject | Self::SecureString)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Array => "Array",
            Self::Bool => "Bool",
            Self::Float => "Float",
            Self::Int => "Int",
            Self::Object => "Object",
            Self::SecureObject => "SecureObject",
            Self::SecureString => "SecureString",
            Self::String => "String",
        }
    }
}

fn declared_type(definitions: &Value, name: &str) -> Result<ParameterType> {
    let raw = definitions
        .get(name)
        .and_then(|p| p.get("type"))
        .and_then(|t| t.as_str())
        .with_context(|| format!("no parameter definition for {}", name))?;
    ParameterType::parse(raw)
}

/// Typed `properties.parameters` from string values and the definition's
/// `parameters` declarations
pub fn expand_parameters(input: &Map<String, Value>, definitions: &Value) -> Result<Value> {
    let mut output = Map::new();
    for (name, raw) in input {
        let ty = declared_type(definitions, name)?;
        let text = raw.as_str().unwrap_or_default();
        let value = match ty {
            ParameterType::String | ParameterType::SecureString => Value::String(text.to_string()),
            ParameterType::Bool => Value::Bool(
                text.trim()
                    .parse::<bool>()
                    .with_context(|| format!("parsing parameter {:?} as a bool", name))?,
            ),
            _ => serde_json::from_str(text)
                .with_context(|| format!("parsing parameter {:?} as {}", name, ty.as_str()))?,
        };
        output.insert(name.clone(), json!({ "type": ty.as_str(), "value": value }));
    }
    Ok(Value::Object(output))
}

/// String form of the typed parameters returned by the API
///
/// Secure values never come back, so they are taken from `prior`.
pub fn flatten_parameters(
    input: Option<&Value>,
    definitions: &Value,
    prior: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut output = Map::new();
    let Some(parameters) = input.and_then(|v| v.as_object()) else {
        return Ok(output);
    };

    for (name, parameter) in parameters {
        let ty = match parameter.get("type").and_then(|t| t.as_str()) {
            Some(raw) => ParameterType::parse(raw)?,
            None => declared_type(definitions, name)?,
        };
        if ty.is_secure() {
            if let Some(v) = prior.get(name) {
                output.insert(name.clone(), v.clone());
            }
            continue;
        }

        let value = parameter.get("value").unwrap_or(&Value::Null);
        let text = match (ty, value) {
            (ParameterType::String, Value::String(s)) => s.clone(),
            (ParameterType::Bool, Value::Bool(b)) => b.to_string(),
            (ParameterType::Int, Value::Number(n)) => match n.as_i64() {
                Some(i) => i.to_string(),
                None => n.to_string(),
            },
            (ParameterType::Float, Value::Number(n)) => n.to_string(),
            (ParameterType::Array | ParameterType::Object, v) => serde_json::to_string(v)
                .with_context(|| format!("serializing parameter {:?}", name))?,
            (ty, v) => bail!(
                "parameter {:?} is declared as {} but the API returned {}",
                name,
                ty.as_str(),
                v
            ),
        };
        output.insert(name.clone(), Value::String(text));
    }
    Ok(output)
}

/// `workflow_parameters` values are JSON documents held as strings
pub fn expand_workflow_parameters(input: &Map<String, Value>) -> Result<Value> {
    let mut output = Map::new();
    for (name, raw) in input {
        let text = raw.as_str().unwrap_or_default();
        let value: Value = serde_json::from_str(text)
            .with_context(|| format!("parsing workflow parameter {:?} as JSON", name))?;
        output.insert(name.clone(), value);
    }
    Ok(Value::Object(output))
}

pub fn flatten_workflow_parameters(input: Option<&Value>) -> Result<Map<String, Value>> {
    let mut output = Map::new();
    for (name, value) in input.and_then(|v| v.as_object()).into_iter().flatten() {
        let text = serde_json::to_string(value)
            .with_context(|| format!("serializing workflow parameter {:?}", name))?;
        output.insert(name.clone(), Value::String(text));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Value {
        json!({
            "flag": {"type": "Bool"},
            "count": {"type": "Int"},
            "ratio": {"type": "Float"},
            "items": {"type": "Array"},
            "config": {"type": "Object"},
            "name": {"type": "String"},
            "password": {"type": "SecureString"}
        })
    }

    fn strings(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_expand_parses_declared_types() {
        let input = strings(&[
            ("flag", "true"),
            ("count", "3"),
            ("ratio", "0.5"),
            ("items", "[1,2]"),
            ("config", "{\"a\":\"b\"}"),
            ("name", "x"),
            ("password", "hunter2"),
        ]);
        let out = expand_parameters(&input, &definitions()).unwrap();
        assert_eq!(out["flag"], json!({"type": "Bool", "value": true}));
        assert_eq!(out["count"]["value"], json!(3));
        assert_eq!(out["ratio"]["value"], json!(0.5));
        assert_eq!(out["items"]["value"], json!([1, 2]));
        assert_eq!(out["config"]["value"], json!({"a": "b"}));
        assert_eq!(out["name"]["value"], json!("x"));
        assert_eq!(out["password"], json!({"type": "SecureString", "value": "hunter2"}));
    }

    #[test]
    fn test_expand_requires_a_definition() {
        let err = expand_parameters(&strings(&[("other", "1")]), &definitions()).unwrap_err();
        assert!(err.to_string().contains("no parameter definition for other"));
    }

    #[test]
    fn test_expand_rejects_malformed_values() {
        assert!(expand_parameters(&strings(&[("count", "three")]), &definitions()).is_err());
        assert!(expand_parameters(&strings(&[("flag", "yes")]), &definitions()).is_err());
    }

    #[test]
    fn test_flatten_renders_strings_and_keeps_secrets() {
        let api = json!({
            "flag": {"type": "Bool", "value": false},
            "count": {"type": "Int", "value": 3},
            "items": {"type": "Array", "value": [1, 2]},
            "name": {"type": "String", "value": "x"},
            "password": {"type": "SecureString"}
        });
        let prior = strings(&[("password", "hunter2")]);
        let out = flatten_parameters(Some(&api), &definitions(), &prior).unwrap();
        assert_eq!(out["flag"], json!("false"));
        assert_eq!(out["count"], json!("3"));
        assert_eq!(out["items"], json!("[1,2]"));
        assert_eq!(out["name"], json!("x"));
        assert_eq!(out["password"], json!("hunter2"));
    }

    #[test]
    fn test_flatten_drops_secrets_without_prior() {
        let api = json!({"password": {"type": "SecureString"}});
        let out = flatten_parameters(Some(&api), &definitions(), &Map::new()).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_workflow_parameters() {
        let input = strings(&[("p", "{\"type\":\"String\",\"defaultValue\":\"a\"}")]);
        let expanded = expand_workflow_parameters(&input).unwrap();
        assert_eq!(expanded["p"]["defaultValue"], json!("a"));

        let flattened = flatten_workflow_parameters(Some(&expanded)).unwrap();
        let back: Value = serde_json::from_str(flattened["p"].as_str().unwrap()).unwrap();
        assert_eq!(back, expanded["p"]);

        assert!(expand_workflow_parameters(&strings(&[("p", "not json")])).is_err());
    }
}
