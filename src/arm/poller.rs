//! Long-running operation polling
//!
//! ARM answers slow PUT/PATCH/POST/DELETE requests with 201/202 and a URL to
//! poll: `Azure-AsyncOperation` (a status document) or `Location` (answers
//! 202 until the operation finishes). Resources created synchronously but
//! still provisioning expose `properties.provisioningState` instead.

use super::client::ArmClient;
use super::http::ArmResponse;
use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// How the outcome of an operation is tracked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStrategy {
    /// Status document at the `Azure-AsyncOperation` URL
    AsyncOperation(String),
    /// `Location` URL which answers 202 while running
    Location(String),
    /// `properties.provisioningState` of the resource itself
    ProvisioningState(String),
}

/// Operation ended in a failed or cancelled state
#[derive(Debug, Clone, thiserror::Error)]
#[error("long-running operation finished with status {status:?}: {code}: {message}")]
pub struct OperationError {
    pub status: String,
    pub code: String,
    pub message: String,
}

/// Terminal-state classification of an ARM status string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationStatus {
    Succeeded,
    Failed,
    InProgress,
}

fn classify(status: &str) -> OperationStatus {
    match status.to_lowercase().as_str() {
        "succeeded" => OperationStatus::Succeeded,
        "failed" | "canceled" | "cancelled" => OperationStatus::Failed,
        _ => OperationStatus::InProgress,
    }
}

impl PollStrategy {
    /// Decide whether a response needs polling at all
    ///
    /// `resource_url` is used for provisioning-state polling of PUT/PATCH
    /// responses that carry no operation headers.
    pub fn from_response(response: &ArmResponse, resource_url: Option<&str>) -> Option<Self> {
        if let Some(url) = response.header("azure-asyncoperation") {
            return Some(Self::AsyncOperation(url.to_string()));
        }
        if response.status == StatusCode::ACCEPTED {
            if let Some(url) = response.header("location") {
                return Some(Self::Location(url.to_string()));
            }
        }

        let state = provisioning_state(&response.body)?;
        match (classify(state), resource_url) {
            (OperationStatus::InProgress, Some(url)) => Some(Self::ProvisioningState(url.to_string())),
            _ => None,
        }
    }
}

/// Interval requested by the service via `Retry-After` (seconds form only)
pub fn retry_after(response: &ArmResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn provisioning_state(body: &Value) -> Option<&str> {
    body.get("properties")
        .and_then(|p| p.get("provisioningState"))
        .and_then(|s| s.as_str())
}

fn operation_error(status: &str, body: &Value) -> OperationError {
    let error = body.get("error").or_else(|| body.get("properties").and_then(|p| p.get("error")));
    OperationError {
        status: status.to_string(),
        code: error
            .and_then(|e| e.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        message: error
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("no error details returned")
            .to_string(),
    }
}

/// Poll until the operation reaches a terminal state
///
/// Returns the final body for `Location` polling (may be Null) and the last
/// status document otherwise.
pub async fn wait_for_completion(
    client: &ArmClient,
    strategy: &PollStrategy,
    initial_interval: Option<Duration>,
) -> Result<Value> {
    let mut interval = initial_interval.unwrap_or(client.poll_interval());
    let mut polls: u32 = 0;

    loop {
        tokio::time::sleep(interval).await;
        polls += 1;

        let url = match strategy {
            PollStrategy::AsyncOperation(url) | PollStrategy::ProvisioningState(url) => url,
            PollStrategy::Location(url) => {
                let response = client
                    .send_url(Method::GET, url)
                    .await
                    .context("polling operation location")?;
                if response.status == StatusCode::ACCEPTED {
                    tracing::debug!("Operation still running after {} polls", polls);
                    interval = retry_after(&response).unwrap_or(client.poll_interval());
                    continue;
                }
                return Ok(response.body);
            }
        };

        let response = client
            .send_url(Method::GET, url)
            .await
            .context("polling operation status")?;
        let status = match strategy {
            PollStrategy::ProvisioningState(_) => provisioning_state(&response.body),
            _ => response.body.get("status").and_then(|s| s.as_str()),
        }
        .unwrap_or("InProgress")
        .to_string();

        match classify(&status) {
            OperationStatus::Succeeded => {
                tracing::debug!("Operation succeeded after {} polls", polls);
                return Ok(response.body);
            }
            OperationStatus::Failed => {
                return Err(operation_error(&status, &response.body).into());
            }
            OperationStatus::InProgress => {
                tracing::debug!("Operation status {:?} after {} polls", status, polls);
                interval = retry_after(&response).unwrap_or(client.poll_interval());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    fn response(status: StatusCode, headers: &[(&'static str, &str)], body: Value) -> ArmResponse {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        ArmResponse {
            status,
            headers: map,
            body,
        }
    }

    #[test]
    fn test_async_operation_header_wins() {
        let r = response(
            StatusCode::CREATED,
            &[("azure-asyncoperation", "https://op"), ("location", "https://loc")],
            Value::Null,
        );
        assert_eq!(
            PollStrategy::from_response(&r, None),
            Some(PollStrategy::AsyncOperation("https://op".to_string()))
        );
    }

    #[test]
    fn test_location_only_for_accepted() {
        let r = response(StatusCode::ACCEPTED, &[("location", "https://loc")], Value::Null);
        assert_eq!(
            PollStrategy::from_response(&r, None),
            Some(PollStrategy::Location("https://loc".to_string()))
        );

        let r = response(StatusCode::OK, &[("location", "https://loc")], Value::Null);
        assert_eq!(PollStrategy::from_response(&r, None), None);
    }

    #[test]
    fn test_provisioning_state_polling() {
        let r = response(
            StatusCode::CREATED,
            &[],
            json!({"properties": {"provisioningState": "Creating"}}),
        );
        assert_eq!(
            PollStrategy::from_response(&r, Some("https://res")),
            Some(PollStrategy::ProvisioningState("https://res".to_string()))
        );

        let done = response(
            StatusCode::OK,
            &[],
            json!({"properties": {"provisioningState": "Succeeded"}}),
        );
        assert_eq!(PollStrategy::from_response(&done, Some("https://res")), None);
    }

    #[test]
    fn test_retry_after_seconds() {
        let r = response(StatusCode::ACCEPTED, &[("retry-after", "7")], Value::Null);
        assert_eq!(retry_after(&r), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_operation_error_details() {
        let err = operation_error(
            "Failed",
            &json!({"status": "Failed", "error": {"code": "QuotaExceeded", "message": "no cores"}}),
        );
        assert_eq!(err.code, "QuotaExceeded");
        assert_eq!(err.message, "no cores");
    }
}
