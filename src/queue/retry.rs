//! Retry decisions with exponential backoff.
//!
//! A failed job is classified into a [`FailureType`]; the [`RetryPolicy`]
//! then decides whether it runs again and after what delay:
//!
//! ```text
//! delay(n) = min(retry_delay * 2^(n-1), max_delay) + jitter    (n = retry number, 1-based)
//! ```
//!
//! With the defaults that is 1s, 2s, 4s before the job is given up.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

/// Default maximum retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff (1 second).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(32);

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Network error, timeout, unexpected status or page. May succeed later.
    Transient,
    /// The portal said this document is unavailable.
    Skip,
    /// The portal session is gone; nothing should run again.
    SessionLost,
}

/// Decision on whether to run a failed job again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
        /// Retry number of the next attempt (1-based).
        retry_count: u32,
    },
    DoNotRetry {
        reason: String,
    },
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    /// Upper bound of the random delay added to each wait; zero disables it.
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decides what happens after a failure.
    ///
    /// `retry_count` is the number of retries the job already had.
    #[instrument(skip(self), fields(max_retries = self.max_retries))]
    pub fn should_retry(&self, failure_type: FailureType, retry_count: u32) -> RetryDecision {
        match failure_type {
            FailureType::Skip => {
                return RetryDecision::DoNotRetry {
                    reason: "document unavailable on the portal".to_string(),
                };
            }
            FailureType::SessionLost => {
                return RetryDecision::DoNotRetry {
                    reason: "portal session lost".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if retry_count >= self.max_retries {
            debug!(retry_count, "max retries reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max retries ({}) exhausted", self.max_retries),
            };
        }

        let next = retry_count + 1;
        let delay = self.delay_for(next);
        debug!(retry_count = next, delay_ms = delay.as_millis(), "will retry");
        RetryDecision::Retry {
            delay,
            retry_count: next,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        delay + self.calculate_jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = self.jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
