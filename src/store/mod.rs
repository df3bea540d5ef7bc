//! Persistent key-value store for scan and download snapshots.
//!
//! The engine only needs named `get`/`set`; values are JSON. Two backends
//! are provided: [`MemoryStore`] for one-shot runs and tests, and
//! [`SqliteStore`] for state that must survive a restart.

mod error;
mod sqlite;

pub use error::StoreError;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Well-known store keys.
pub mod keys {
    /// Latest [`ScanProgress`](crate::pagination::ScanProgress).
    pub const SCAN_PROGRESS: &str = "scan_progress";
    /// Final [`ScanSummary`](crate::pagination::ScanSummary) of the last traversal.
    pub const SCAN_SUMMARY: &str = "scan_summary";
    /// Documents found by the last traversal.
    pub const DOCUMENTS: &str = "documents";
    /// Latest [`DownloadSession`](crate::queue::DownloadSession) snapshot.
    pub const DOWNLOAD_SESSION: &str = "download_session";
}

/// Named JSON values that survive between operations.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Deletes a value if present.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Serializes `value` and stores it under `key`.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if encoding fails, or the backend error.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let encoded = serde_json::to_value(value).map_err(|e| StoreError::serialization(key, e))?;
    store.set(key, encoded).await
}

/// Loads and decodes the value stored under `key`.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the stored value has the wrong shape.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::serialization(key, e)),
        None => Ok(None),
    }
}

/// In-process store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, Value>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        count: u32,
        label: String,
    }

    #[tokio::test]
    async fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.get("a").await.unwrap().is_none());

        store.set("a", json!({"n": 1})).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"n": 1})));
        assert_eq!(store.len(), 1);

        store.set("a", json!(2)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!(2)));

        store.remove("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_json_helpers_roundtrip_typed_value() {
        let store = MemoryStore::new();
        let snapshot = Snapshot {
            count: 3,
            label: "page".to_string(),
        };
        save_json(&store, "snap", &snapshot).await.unwrap();
        let loaded: Option<Snapshot> = load_json(&store, "snap").await.unwrap();
        assert_eq!(loaded, Some(snapshot));
    }

    #[tokio::test]
    async fn test_load_json_reports_shape_mismatch() {
        let store = MemoryStore::new();
        store.set("snap", json!("not an object")).await.unwrap();
        let result: Result<Option<Snapshot>, _> = load_json(&store, "snap").await;
        assert!(matches!(
            result,
            Err(StoreError::Serialization { ref key, .. }) if key == "snap"
        ));
    }
}
