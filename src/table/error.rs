//! Error types for table scanning and pagination.

use thiserror::Error;

use super::header::HeaderKey;
use crate::page::PageError;
use crate::store::StoreError;

/// Errors raised while scanning portal tables.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Neither table kind is rendered on the page.
    #[error("no documents table found on the page")]
    TableNotFound,

    /// Required columns could not be resolved from the header row.
    #[error("incomplete header mapping for {table}: missing {}", format_keys(.missing))]
    IncompleteHeaderMap {
        /// Element id of the table.
        table: String,
        /// Required keys that were not resolved.
        missing: Vec<HeaderKey>,
    },

    /// A traversal is already running on this driver.
    #[error("a scan is already in progress")]
    AlreadyRunning,

    /// The page accessor failed.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// Persisting scan state failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

fn format_keys(keys: &[HeaderKey]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
