//! Exponential backoff for upstream requests

use crate::error::{RetryFailure, SourceError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Base delay doubling per attempt, capped, with an attempt ceiling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first (at least 1)
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay after the given failed attempt (1-based): `base × 2^(attempt-1)`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, hits a non-retryable error, or the attempt ceiling
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(source = label, attempt, "Upstream recovered after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    source = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Upstream request failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                tracing::warn!(source = label, attempt, %error, "Upstream request failed for good");
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}
