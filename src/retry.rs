//! Bounded retry with linear backoff.
//!
//! Shared by the NetCDF gateway and the HTTP latest-month lookup. The delay
//! before retry `n` is `base_backoff * n`; there is no jitter.

use std::time::Duration;
use tracing::{info, warn};

use crate::error::{IndicatorError, Result};

/// Retry parameters for a remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Multiplied by the attempt index to get the sleep before the next attempt
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// A single attempt, no sleeping
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Sleep that follows failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_backoff * attempt
    }

    /// Run `op`, retrying while `is_retriable` accepts the error.
    ///
    /// `op` receives the 1-based attempt number. A non-retriable error is
    /// returned unchanged on the spot; a retriable error that survives the
    /// last attempt is escalated to [`IndicatorError::Connectivity`].
    pub fn run<T, F, P>(&self, operation: &str, mut op: F, is_retriable: P) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        P: Fn(&IndicatorError) -> bool,
    {
        let mut attempt = 1;
        loop {
            info!(
                operation = operation,
                attempt = attempt,
                max_attempts = self.max_attempts,
                "Attempting remote operation"
            );

            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_retriable(&err) {
                warn!(operation = operation, error = %err, "Non-retriable failure");
                return Err(err);
            }

            if attempt >= self.max_attempts {
                warn!(
                    operation = operation,
                    attempts = attempt,
                    error = %err,
                    "Giving up after exhausting retries"
                );
                return Err(IndicatorError::Connectivity {
                    attempts: attempt,
                    message: format!("{operation}: {err}"),
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation = operation,
                attempt = attempt,
                error = %err,
                sleep_secs = delay.as_secs_f64(),
                "Attempt failed, backing off"
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }

    /// [`RetryPolicy::run`] with the default transient-error classification
    pub fn run_transient<T, F>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.run(operation, op, IndicatorError::is_transient)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(20))
    }
}
