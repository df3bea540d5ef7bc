//! Error types for queue operations.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by [`DownloadQueue`](super::DownloadQueue).
#[derive(Debug, Error)]
pub enum QueueError {
    /// A configuration value is out of range.
    #[error("invalid queue config: {field} {message}")]
    InvalidConfig {
        /// Offending field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// `process_queue` was called while a run is in progress.
    #[error("download queue is already processing")]
    AlreadyRunning,

    /// Session snapshot persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Creates an invalid config error.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}
