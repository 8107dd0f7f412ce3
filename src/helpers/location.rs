//! Azure locations
//!
//! The API accepts display names ("West Europe") but returns the short form
//! ("westeurope"); state always holds the short form.

use serde_json::Value;

/// Normalize a location: lowercase without spaces
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized `location` of an API response, empty when absent
pub fn normalize_nilable(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(normalize)
        .unwrap_or_default()
}
