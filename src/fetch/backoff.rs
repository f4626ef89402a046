//! Shared fetch-with-retry primitive.
//!
//! Every upstream integration goes through [`fetch_with_retry`]; none of
//! them carries its own retry loop. Retries cover transport failures and
//! non-2xx statuses only. Payload decoding happens after this primitive and
//! is never retried, since a malformed body will not improve on a second
//! request.

use crate::config::RetrySettings;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failure modes of one upstream fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to decode payload: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Decode(_))
    }

    pub fn transport(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }

    pub fn decode(err: reqwest::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

/// Exponential backoff policy: `base_delay * multiplier^retry_index`, with
/// an optional random jitter fraction on top.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Upper bound of the random fraction added to each delay; 0.0 disables
    /// jitter entirely (tests rely on exact delays).
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
        }
    }

    /// Deterministic delay before retry `retry_index` (0-indexed).
    pub fn delay(&self, retry_index: u32) -> Duration {
        self.base_delay
            .mul_f64(self.multiplier.powi(retry_index as i32))
    }

    fn jittered_delay(&self, retry_index: u32) -> Duration {
        let base = self.delay(retry_index);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = 1.0 + rand::rng().random_range(0.0..self.jitter);
        base.mul_f64(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}

/// Issue a request with bounded retries and exponential backoff.
///
/// `build_request` is invoked once per attempt so the request body/headers
/// are rebuilt fresh. The delay is slept before each retry; after the final
/// failed attempt the most recent error is returned without sleeping.
pub async fn fetch_with_retry<F>(
    policy: &RetryPolicy,
    mut build_request: F,
) -> Result<reqwest::Response, FetchError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = FetchError::Transport("no attempts made".to_string());

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(policy.jittered_delay(attempt - 1)).await;
        }

        match build_request().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                warn!(
                    "Fetch attempt {}/{} returned status {}",
                    attempt + 1,
                    attempts,
                    status
                );
                last_error = FetchError::Status(status);
            }
            Err(err) => {
                warn!("Fetch attempt {}/{} failed: {}", attempt + 1, attempts, err);
                last_error = FetchError::transport(err);
            }
        }
    }

    Err(last_error)
}
