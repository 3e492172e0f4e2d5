use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::RoutingConfig;
use crate::error::RouteError;

/// Bounded retries with linear backoff and a per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub rate_limit_backoff: Duration,
    pub error_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            rate_limit_backoff: Duration::from_millis(config.rate_limit_backoff_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff_for(&self, error: &RouteError, attempt: u32) -> Duration {
        let base = match error {
            RouteError::Unavailable { .. } => self.rate_limit_backoff,
            _ => self.error_backoff,
        };
        base.saturating_mul(attempt)
    }

    /// Run `attempt_fn` until it succeeds, fails definitively, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut attempt_fn: F) -> Result<T, RouteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RouteError>>,
    {
        let mut last_error = RouteError::NoRoute;
        for attempt in 1..=self.max_attempts {
            let outcome = timeout(self.attempt_timeout, attempt_fn(attempt))
                .await
                .unwrap_or(Err(RouteError::Timeout));

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(attempt, %error, "route request rejected, not retrying");
                return Err(error);
            }

            warn!(attempt, max_attempts = self.max_attempts, %error, "route attempt failed");
            if attempt < self.max_attempts {
                sleep(self.backoff_for(&error, attempt)).await;
            }
            last_error = error;
        }
        Err(last_error)
    }
}
