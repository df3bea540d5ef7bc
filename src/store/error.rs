//! Error types for key-value store operations.

use thiserror::Error;

/// Errors raised by [`KeyValueStore`](super::KeyValueStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database failed.
    #[error("store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be encoded or decoded.
    #[error("failed to (de)serialize store key {key}: {source}")]
    Serialization {
        /// Key being read or written.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Creates a serialization error for a key.
    pub fn serialization(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.into(),
            source,
        }
    }
}
