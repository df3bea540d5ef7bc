//! Queue scheduling configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::QueueError;
use super::retry::{DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_DELAY, RetryPolicy};

const BATCH_SIZE_RANGE: RangeInclusive<usize> = 1..=100;
const CONCURRENCY_RANGE: RangeInclusive<usize> = 1..=20;
const MAX_RETRIES_RANGE: RangeInclusive<u32> = 0..=10;
const MAX_DELAY_MS: u64 = 600_000;

/// Batching, concurrency and retry settings for [`DownloadQueue`](super::DownloadQueue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs released together.
    pub batch_size: usize,
    /// Jobs of one batch running at the same time.
    pub concurrency: usize,
    /// Retries after the first attempt of a transient failure.
    pub max_retries: u32,
    /// Base backoff delay; doubles with each retry.
    #[serde(with = "crate::serde_util::millis")]
    pub retry_delay: Duration,
    /// Upper bound of a single backoff delay.
    #[serde(with = "crate::serde_util::millis")]
    pub max_retry_delay: Duration,
    /// Random extra delay per retry, up to this bound.
    #[serde(with = "crate::serde_util::millis")]
    pub retry_jitter: Duration,
    /// Pause between two batches.
    #[serde(with = "crate::serde_util::millis")]
    pub delay_between_batches: Duration,
    /// Finished jobs between two session snapshots.
    pub progress_save_interval: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 3,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            retry_jitter: Duration::ZERO,
            delay_between_batches: Duration::from_millis(2000),
            progress_save_interval: 5,
        }
    }
}

impl QueueConfig {
    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), QueueError> {
        if !BATCH_SIZE_RANGE.contains(&self.batch_size) {
            return Err(out_of_range("batch_size", self.batch_size, &BATCH_SIZE_RANGE));
        }
        if !CONCURRENCY_RANGE.contains(&self.concurrency) {
            return Err(out_of_range("concurrency", self.concurrency, &CONCURRENCY_RANGE));
        }
        if !MAX_RETRIES_RANGE.contains(&self.max_retries) {
            return Err(out_of_range("max_retries", self.max_retries, &MAX_RETRIES_RANGE));
        }
        if self.progress_save_interval == 0 {
            return Err(QueueError::invalid_config(
                "progress_save_interval",
                "must be at least 1",
            ));
        }
        for (field, value) in [
            ("retry_delay", self.retry_delay),
            ("max_retry_delay", self.max_retry_delay),
            ("retry_jitter", self.retry_jitter),
            ("delay_between_batches", self.delay_between_batches),
        ] {
            if value > Duration::from_millis(MAX_DELAY_MS) {
                return Err(QueueError::invalid_config(
                    field,
                    format!("{}ms exceeds {MAX_DELAY_MS}ms", value.as_millis()),
                ));
            }
        }
        Ok(())
    }

    /// Backoff policy derived from the retry settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay, self.max_retry_delay)
            .with_jitter(self.retry_jitter)
    }

    /// Number of batches needed for `jobs` jobs.
    #[must_use]
    pub fn batches_for(&self, jobs: usize) -> usize {
        jobs.div_ceil(self.batch_size.max(1))
    }
}

fn out_of_range<T: std::fmt::Display>(
    field: &'static str,
    value: T,
    range: &RangeInclusive<T>,
) -> QueueError {
    QueueError::invalid_config(
        field,
        format!(
            "{value} is out of range {}..={}",
            range.start(),
            range.end()
        ),
    )
}
