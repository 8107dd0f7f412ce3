//! Waiting for a remote status to settle
//!
//! [`StateChangeConf`] refreshes an object at a fixed interval until its
//! status leaves the pending set and lands in the target set.

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Why waiting stopped without reaching a target state
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timeout while waiting for state to become '{expected}' (last state: '{last_state}', timeout: {timeout:?})")]
    Timeout {
        last_state: String,
        expected: String,
        timeout: Duration,
    },

    #[error("unexpected state '{state}', wanted target '{expected}'")]
    UnexpectedState { state: String, expected: String },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: u32 },

    #[error(transparent)]
    Refresh(anyhow::Error),
}

/// Refresh outcome: `None` when the object does not exist
pub type Refreshed = Option<(Value, String)>;

pub struct StateChangeConf<F> {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub refresh: F,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    pub poll_interval: Duration,
    pub not_found_checks: u32,
    /// Consecutive target hits required before returning
    pub continuous_target_occurence: u32,
}

impl<F, Fut> StateChangeConf<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<Refreshed>>,
{
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration, refresh: F) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            refresh,
            timeout,
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(10),
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurence: 1,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    pub fn continuous_target_occurence(mut self, count: u32) -> Self {
        self.continuous_target_occurence = count.max(1);
        self
    }

    /// Poll until a target state is reached; returns the last refreshed object
    ///
    /// With an empty target set, the object disappearing counts as success.
    pub async fn wait_for_state(&self) -> Result<Value, WaitError> {
        let deadline = Instant::now().checked_add(self.timeout);
        let expected = self.target.join(", ");

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut not_found: u32 = 0;
        let mut target_hits: u32 = 0;
        let mut last_state = String::new();

        loop {
            match (self.refresh)().await.map_err(WaitError::Refresh)? {
                None if self.target.is_empty() => return Ok(Value::Null),
                None => {
                    not_found += 1;
                    target_hits = 0;
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound { checks: not_found });
                    }
                    tracing::debug!("Object not found yet ({} checks)", not_found);
                }
                Some((object, state)) => {
                    not_found = 0;
                    if self.target.contains(&state) {
                        target_hits += 1;
                        if target_hits >= self.continuous_target_occurence {
                            return Ok(object);
                        }
                    } else if self.pending.contains(&state) {
                        target_hits = 0;
                    } else {
                        return Err(WaitError::UnexpectedState { state, expected });
                    }
                    tracing::debug!("Waiting for {:?}, current state {:?}", expected, state);
                    last_state = state;
                }
            }

            let remaining = deadline
                .map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()));
            if remaining.is_zero() {
                return Err(WaitError::Timeout {
                    last_state,
                    expected,
                    timeout: self.timeout,
                });
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}
