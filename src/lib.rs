//! Comprobantes Core Library
//!
//! Extracts the electronic-document records shown in the paginated tables of
//! a tax compliance portal and bulk downloads their XML or PDF files.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`document`] - Document records, table kinds and file formats
//! - [`page`] - Page accessor capability and the captured-HTML implementation
//! - [`table`] - Header mapping, cell conversions and row extraction
//! - [`pagination`] - Multi-page traversal with progress reporting
//! - [`download`] - Portal download request, response classification, delivery
//! - [`queue`] - Batched download scheduling with retry and session snapshots
//! - [`store`] - Key-value persistence for progress and sessions
//! - [`harvester`] - Context object exposing the scan and download operations

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod document;
pub mod download;
pub mod harvester;
pub mod page;
pub mod pagination;
pub mod queue;
mod serde_util;
pub mod store;
pub mod table;

// Re-export commonly used types
pub use document::{Document, DocumentFormat, TableKind};
pub use download::{
    DownloadContext, DownloadError, DownloadJobExecutor, DownloadTrigger, FileTrigger, JobOutcome,
};
pub use harvester::Harvester;
pub use page::{HtmlSnapshotPage, PageAccessor, PageError, TableHandle, TableRow};
pub use pagination::{PaginationDriver, PaginationInfo, ScanOptions, ScanProgress, ScanReport};
pub use queue::{
    DownloadQueue, DownloadSession, DownloadSummary, JobRunner, QueueConfig, QueueError,
    QueueProgress, RunOutcome,
};
pub use store::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
pub use table::{HeaderMap, HeaderMapper, ScanError, TableScanner};
