//! Bounded exponential backoff for network collaborators.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryConfig;
use crate::metrics;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(retry.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && e.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = label,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    metrics::RETRY_ATTEMPTS.inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
