use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

use crate::error::{BridgeError, BridgeResult};

/// Retry and timeout policy for a single workflow step.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait before the second attempt
    pub initial_interval: Duration,
    /// Multiplier applied to the wait after each failed attempt
    pub backoff_coefficient: f64,
    /// Upper bound for any single wait
    pub maximum_interval: Duration,
    /// Total attempts, including the first one
    pub maximum_attempts: u32,
    /// Timeout for one attempt
    pub start_to_close_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(60),
            maximum_attempts: 5,
            start_to_close_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Same policy with a different attempt cap.
    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts.max(1);
        self
    }

    /// Capped exponential backoff for this policy, without jitter or an
    /// elapsed-time limit. The attempt cap is enforced by [`execute_activity`].
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(self.backoff_coefficient)
            .with_max_interval(self.maximum_interval)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Runs `step` under `policy`.
///
/// Each attempt is bounded by `start_to_close_timeout`. Retryable failures
/// (see [`BridgeError::is_retryable`]) are retried after a capped exponential
/// backoff until `maximum_attempts` is reached; anything else is returned
/// immediately.
pub async fn execute_activity<T, F, Fut>(name: &str, policy: &RetryPolicy, mut step: F) -> BridgeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BridgeResult<T>>,
{
    let attempts = AtomicU32::new(0);
    let operation = || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = step();
        async move {
            let result = match tokio::time::timeout(policy.start_to_close_timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(BridgeError::ActivityTimeout(name.to_string())),
            };
            result.map_err(|e| {
                if e.is_retryable() && attempt < policy.maximum_attempts {
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    };
    let notify = |e: BridgeError, wait: Duration| {
        warn!(
            "Step '{}' attempt {}/{} failed: {}. Retrying in {:?}",
            name,
            attempts.load(Ordering::SeqCst),
            policy.maximum_attempts,
            e,
            wait
        );
    };
    backoff::future::retry_notify(policy.backoff(), operation, notify).await
}
