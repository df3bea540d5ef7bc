//! Progress snapshots of a queue run.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Counters reported to progress listeners.
///
/// `completed_docs + failed_docs + pending_docs` always equals the queue
/// total; jobs in flight count as pending.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueProgress {
    pub current_batch: usize,
    pub total_batches: usize,
    pub completed_docs: usize,
    pub failed_docs: usize,
    pub pending_docs: usize,
    /// Completed documents per minute.
    pub current_speed: f64,
    /// Seconds until the pending documents are done at the current speed.
    pub estimated_time_remaining: Option<f64>,
}

impl QueueProgress {
    /// Fills in speed and ETA from the completed count and elapsed time.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub(crate) fn with_rates(mut self, elapsed: Duration) -> Self {
        let minutes = elapsed.as_secs_f64() / 60.0;
        self.current_speed = if minutes > 0.0 {
            self.completed_docs as f64 / minutes
        } else {
            0.0
        };
        self.estimated_time_remaining = (self.current_speed > 0.0)
            .then(|| self.pending_docs as f64 / self.current_speed * 60.0);
        self
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.completed_docs + self.failed_docs + self.pending_docs
    }
}
