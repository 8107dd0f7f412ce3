//! HTTP utilities for ARM REST API calls

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Error returned by the Resource Manager for a non-success status
#[derive(Debug, Clone, thiserror::Error)]
#[error("API request failed: {status} ({code}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    /// ARM error code, e.g. `ResourceGroupNotFound`
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Build from an ARM error body: `{"error": {"code": "...", "message": "..."}}`
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));

        let code = error
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown"))
            .to_string();
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| sanitize_for_log(body));

        Self {
            status,
            code,
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

/// A raw response: status, headers and the parsed JSON body (Null when empty)
#[derive(Debug, Clone)]
pub struct ArmResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ArmResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
    /// Sent as `x-ms-correlation-request-id` so a run can be traced on the Azure side
    correlation_id: Option<String>,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new(correlation_id: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("azrm/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            correlation_id,
        })
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Send a request and return the raw response, whatever its status
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<ArmResponse> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(id) = &self.correlation_id {
            request = request.header("x-ms-correlation-request-id", id);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(ApiError::from_body(status, &text).into());
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).context("Failed to parse response JSON")?
        };

        Ok(ArmResponse {
            status,
            headers,
            body,
        })
    }

    /// Make a GET request and return the JSON body
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        Ok(self.send(Method::GET, url, token, None).await?.body)
    }

    /// Make a PUT request and return the raw response
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<ArmResponse> {
        self.send(Method::PUT, url, token, Some(body)).await
    }

    /// Make a PATCH request and return the raw response
    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> Result<ArmResponse> {
        self.send(Method::PATCH, url, token, Some(body)).await
    }

    /// Make a POST request and return the raw response
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<ArmResponse> {
        self.send(Method::POST, url, token, body).await
    }

    /// Make a DELETE request and return the raw response
    pub async fn delete(&self, url: &str, token: &str) -> Result<ArmResponse> {
        self.send(Method::DELETE, url, token, None).await
    }
}

/// Find the ARM API error anywhere in an error chain
pub fn api_error(error: &anyhow::Error) -> Option<&ApiError> {
    error.chain().find_map(|e| e.downcast_ref::<ApiError>())
}

/// Format an ARM API error for display on the command line
pub fn format_arm_error(error: &anyhow::Error) -> String {
    let Some(api) = api_error(error) else {
        return format!("{:#}", error);
    };

    let hint = match api.status.as_u16() {
        401 => Some("Authentication failed. Run 'az login' or check ARM_CLIENT_ID/ARM_CLIENT_SECRET."),
        403 => Some("Permission denied. Check the role assignments of the identity in use."),
        404 => Some("Resource not found."),
        409 => Some("Resource conflict. The resource may already exist or be in use."),
        429 => Some("Rate limit exceeded. Please try again later."),
        500 | 502 | 503 => Some("Azure service temporarily unavailable. Please try again."),
        _ => None,
    };

    match hint {
        Some(hint) => format!("{:#}\n{}", error, hint),
        None => format!("{:#}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("[truncated, 500 bytes total]"));
        assert!(sanitized.len() < 300);
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("a\nb\tc"), "abc");
    }

    #[test]
    fn test_api_error_from_arm_body() {
        let err = ApiError::from_body(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":"ResourceGroupNotFound","message":"Resource group 'rg' could not be found."}}"#,
        );
        assert!(err.is_not_found());
        assert_eq!(err.code, "ResourceGroupNotFound");
        assert_eq!(err.message, "Resource group 'rg' could not be found.");
    }

    #[test]
    fn test_api_error_from_non_json_body() {
        let err = ApiError::from_body(StatusCode::BAD_GATEWAY, "upstream failed");
        assert_eq!(err.code, "Bad Gateway");
        assert_eq!(err.message, "upstream failed");
    }

    #[test]
    fn test_api_error_found_through_context() {
        let err: anyhow::Error = ApiError::from_body(StatusCode::FORBIDDEN, "").into();
        let err = err.context("retrieving thing");
        assert_eq!(api_error(&err).unwrap().status, StatusCode::FORBIDDEN);
        assert!(format_arm_error(&err).contains("Permission denied"));
    }
}
