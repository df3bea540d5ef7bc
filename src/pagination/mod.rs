//! Multi-page traversal of the documents table.
//!
//! The [`PaginationDriver`] walks the host paginator page by page, runs the
//! [`TableScanner`] on each one and aggregates the documents. Traversal is a
//! small state machine:
//!
//! ```text
//! Idle -> Repaginating (optional, once) -> ScanningPage <-> AwaitingNavigation -> Done
//! ```
//!
//! Progress is published on a [`watch`] channel every few rows and persisted
//! at page boundaries. A failure mid-traversal ends the run but keeps the
//! documents gathered so far.

mod info;

pub use info::PaginationInfo;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::document::{Document, TableKind};
use crate::page::PageAccessor;
use crate::store::{KeyValueStore, keys, save_json};
use crate::table::{ScanError, TableScanner};

/// Default wait after clicking "next".
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Default wait after enlarging the page size.
pub const DEFAULT_REPAGINATE_SETTLE_DELAY: Duration = Duration::from_millis(3000);

/// Default row interval between progress updates.
pub const DEFAULT_PROGRESS_EVERY_ROWS: usize = 10;

/// Default bound on pages visited in one traversal.
pub const DEFAULT_MAX_PAGES: u32 = 500;

/// Options for [`PaginationDriver::scan_all_pages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Enlarge the page size before traversing when more than one page exists.
    pub optimize_pagination: bool,
    /// Wait after each "next" click.
    #[serde(with = "crate::serde_util::millis")]
    pub settle_delay: Duration,
    /// Wait after changing the page size.
    #[serde(with = "crate::serde_util::millis")]
    pub repaginate_settle_delay: Duration,
    /// Rows between progress updates.
    pub progress_every_rows: usize,
    /// Stop after this many pages even if "next" stays enabled.
    pub max_pages: u32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            optimize_pagination: false,
            settle_delay: DEFAULT_SETTLE_DELAY,
            repaginate_settle_delay: DEFAULT_REPAGINATE_SETTLE_DELAY,
            progress_every_rows: DEFAULT_PROGRESS_EVERY_ROWS,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Traversal phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationPhase {
    Idle,
    Repaginating,
    ScanningPage,
    AwaitingNavigation,
    Done,
}

/// Shared progress record published while scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub message: String,
    /// Cumulative rows processed (documents found at page boundaries).
    pub documents_found: usize,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Final summary written to the store when a traversal ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub documents_found: usize,
    pub pages_processed: u32,
    pub table_kind: Option<TableKind>,
    pub optimization_applied: bool,
}

/// Result of scanning the page currently displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentPageScan {
    pub documents: Vec<Document>,
    pub table_kind: TableKind,
    pub pagination: Option<PaginationInfo>,
    pub skipped_rows: usize,
}

/// Result of a full traversal.
///
/// `success == false` still carries every document gathered before the failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub success: bool,
    pub documents: Vec<Document>,
    /// Pagination as last read from the paginator caption.
    pub pagination: Option<PaginationInfo>,
    pub total_pages: u32,
    pub pages_processed: u32,
    pub table_kind: Option<TableKind>,
    pub optimization_applied: bool,
    /// Rows dropped as malformed or unreadable, across all pages.
    pub dropped_rows: usize,
    pub error: Option<String>,
}

impl ScanReport {
    /// Summary persisted under [`keys::SCAN_SUMMARY`].
    #[must_use]
    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            documents_found: self.documents.len(),
            pages_processed: self.pages_processed,
            table_kind: self.table_kind,
            optimization_applied: self.optimization_applied,
        }
    }
}

/// Mutable state of one traversal.
#[derive(Debug, Default)]
struct Traversal {
    documents: Vec<Document>,
    seen_ids: HashSet<String>,
    pagination: Option<PaginationInfo>,
    pages_processed: u32,
    table_kind: Option<TableKind>,
    optimization_applied: bool,
    dropped_rows: usize,
}

impl Traversal {
    fn merge(&mut self, documents: Vec<Document>) -> usize {
        let mut added = 0;
        for document in documents {
            if self.seen_ids.insert(document.id.clone()) {
                self.documents.push(document);
                added += 1;
            } else {
                debug!(id = %document.id, "dropping duplicate document");
            }
        }
        added
    }

    fn total_pages(&self) -> u32 {
        self.pagination
            .map_or(self.pages_processed, |p| p.total.max(self.pages_processed))
    }

    fn into_report(self, error: Option<ScanError>) -> ScanReport {
        let total_pages = self.total_pages();
        ScanReport {
            success: error.is_none(),
            documents: self.documents,
            pagination: self.pagination,
            total_pages,
            pages_processed: self.pages_processed,
            table_kind: self.table_kind,
            optimization_applied: self.optimization_applied,
            dropped_rows: self.dropped_rows,
            error: error.map(|e| e.to_string()),
        }
    }
}

/// Clears the running flag when a traversal ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, ScanError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ScanError::AlreadyRunning)?;
        Ok(Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives the host paginator and aggregates documents across pages.
pub struct PaginationDriver {
    page: Arc<dyn PageAccessor>,
    scanner: TableScanner,
    store: Arc<dyn KeyValueStore>,
    running: AtomicBool,
    progress: watch::Sender<ScanProgress>,
}

impl std::fmt::Debug for PaginationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationDriver")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PaginationDriver {
    #[must_use]
    pub fn new(page: Arc<dyn PageAccessor>, store: Arc<dyn KeyValueStore>) -> Self {
        let (progress, _) = watch::channel(ScanProgress::default());
        Self {
            scanner: TableScanner::new(Arc::clone(&page)),
            page,
            store,
            running: AtomicBool::new(false),
            progress,
        }
    }

    /// Subscribes to progress updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    /// Whether a traversal is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Parses the paginator caption, if one is rendered.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Page`] if the caption cannot be read.
    pub async fn pagination_info(&self) -> Result<Option<PaginationInfo>, ScanError> {
        Ok(self
            .page
            .paginator_caption()
            .await?
            .as_deref()
            .and_then(PaginationInfo::parse))
    }

    /// Scans only the page currently displayed.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::TableNotFound`] when no table is rendered, and
    /// [`ScanError::IncompleteHeaderMap`] when its columns cannot be resolved.
    #[instrument(skip(self))]
    pub async fn scan_current_page(&self) -> Result<CurrentPageScan, ScanError> {
        let pagination = self.pagination_info().await?;
        let table = self
            .scanner
            .detect_table()
            .await?
            .ok_or(ScanError::TableNotFound)?;
        let header_map = self.scanner.header_map(&table).await?;
        let page_number = pagination.map_or(1, |p| p.current);
        let extraction = self
            .scanner
            .extract_page(&table, &header_map, page_number)
            .await?;

        Ok(CurrentPageScan {
            documents: extraction.documents,
            table_kind: table.kind,
            pagination,
            skipped_rows: extraction.skipped_rows + extraction.abandoned_rows,
        })
    }

    /// Walks every page until the "next" control is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::AlreadyRunning`] if another traversal is active.
    /// Every other failure is reported through [`ScanReport::error`].
    #[instrument(skip(self))]
    pub async fn scan_all_pages(&self, options: &ScanOptions) -> Result<ScanReport, ScanError> {
        let _guard = RunningGuard::acquire(&self.running)?;

        let mut traversal = Traversal::default();
        let outcome = self.traverse(options, &mut traversal).await;
        if let Err(error) = &outcome {
            warn!(
                error = %error,
                pages = traversal.pages_processed,
                documents = traversal.documents.len(),
                "scan aborted, keeping partial results"
            );
        }
        let report = traversal.into_report(outcome.err());

        self.publish(ScanProgress {
            message: if report.success {
                format!("Scan complete: {} documents", report.documents.len())
            } else {
                format!(
                    "Scan stopped after {} pages: {}",
                    report.pages_processed,
                    report.error.as_deref().unwrap_or("unknown error")
                )
            },
            documents_found: report.documents.len(),
            current_page: report.pages_processed,
            total_pages: report.total_pages,
        })
        .await;
        self.persist_report(&report).await;

        info!(
            success = report.success,
            documents = report.documents.len(),
            pages = report.pages_processed,
            optimized = report.optimization_applied,
            "scan finished"
        );
        Ok(report)
    }

    async fn traverse(
        &self,
        options: &ScanOptions,
        traversal: &mut Traversal,
    ) -> Result<(), ScanError> {
        let mut phase = PaginationPhase::Idle;
        loop {
            debug!(?phase, pages = traversal.pages_processed, "pagination phase");
            phase = match phase {
                PaginationPhase::Idle => {
                    traversal.pagination = self.pagination_info().await?;
                    let multi_page = traversal.pagination.is_some_and(|p| p.total > 1);
                    if options.optimize_pagination && multi_page {
                        PaginationPhase::Repaginating
                    } else {
                        PaginationPhase::ScanningPage
                    }
                }
                PaginationPhase::Repaginating => {
                    traversal.optimization_applied = self.repaginate(options).await;
                    if traversal.optimization_applied {
                        traversal.pagination = self.pagination_info().await?;
                    }
                    PaginationPhase::ScanningPage
                }
                PaginationPhase::ScanningPage => {
                    self.scan_page(options, traversal).await?;
                    PaginationPhase::AwaitingNavigation
                }
                PaginationPhase::AwaitingNavigation => {
                    if traversal.pages_processed >= options.max_pages {
                        warn!(max_pages = options.max_pages, "page limit reached, stopping");
                        PaginationPhase::Done
                    } else if self.page.is_next_disabled().await? {
                        PaginationPhase::Done
                    } else {
                        self.page.click_next().await?;
                        tokio::time::sleep(options.settle_delay).await;
                        PaginationPhase::ScanningPage
                    }
                }
                PaginationPhase::Done => return Ok(()),
            };
        }
    }

    /// Selects the largest page size offered. Returns whether it was applied.
    async fn repaginate(&self, options: &ScanOptions) -> bool {
        let largest = match self.page.page_size_options().await {
            Ok(sizes) => sizes.into_iter().max(),
            Err(error) => {
                warn!(error = %error, "cannot read page size options, skipping optimization");
                return false;
            }
        };
        let Some(size) = largest else {
            debug!("no page size options rendered");
            return false;
        };

        if let Err(error) = self.page.set_page_size(size).await {
            warn!(size, error = %error, "failed to enlarge page size, continuing unoptimized");
            return false;
        }
        info!(size, "enlarged page size");
        tokio::time::sleep(options.repaginate_settle_delay).await;
        true
    }

    async fn scan_page(
        &self,
        options: &ScanOptions,
        traversal: &mut Traversal,
    ) -> Result<(), ScanError> {
        let page_number = traversal.pages_processed + 1;
        let total_pages = traversal.total_pages().max(page_number);

        let table = self
            .scanner
            .detect_table()
            .await?
            .ok_or(ScanError::TableNotFound)?;
        traversal.table_kind = Some(table.kind);
        let header_map = self.scanner.header_map(&table).await?;

        let every = options.progress_every_rows.max(1);
        let base = traversal.documents.len();
        let progress = &self.progress;
        let extraction = self
            .scanner
            .extract_page_with_progress(&table, &header_map, page_number, |rows| {
                if rows % every == 0 {
                    progress.send_modify(|p| {
                        p.message = format!("Scanning page {page_number}: {rows} rows");
                        p.documents_found = base + rows;
                        p.current_page = page_number;
                        p.total_pages = total_pages;
                    });
                }
            })
            .await?;

        traversal.dropped_rows += extraction.skipped_rows + extraction.abandoned_rows;
        let added = traversal.merge(extraction.documents);
        traversal.pages_processed = page_number;
        debug!(page_number, added, total = traversal.documents.len(), "page merged");

        self.publish(ScanProgress {
            message: format!("Page {page_number} of {total_pages} scanned"),
            documents_found: traversal.documents.len(),
            current_page: page_number,
            total_pages,
        })
        .await;
        Ok(())
    }

    /// Publishes progress and persists it; persistence failures are logged only.
    async fn publish(&self, progress: ScanProgress) {
        if let Err(error) = save_json(self.store.as_ref(), keys::SCAN_PROGRESS, &progress).await {
            warn!(error = %error, "failed to persist scan progress");
        }
        self.progress.send_replace(progress);
    }

    async fn persist_report(&self, report: &ScanReport) {
        if let Err(error) =
            save_json(self.store.as_ref(), keys::SCAN_SUMMARY, &report.summary()).await
        {
            warn!(error = %error, "failed to persist scan summary");
        }
        if let Err(error) = save_json(self.store.as_ref(), keys::DOCUMENTS, &report.documents).await
        {
            warn!(error = %error, "failed to persist scanned documents");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_options_defaults() {
        let options = ScanOptions::default();
        assert!(!options.optimize_pagination);
        assert_eq!(options.settle_delay, Duration::from_millis(1500));
        assert_eq!(options.progress_every_rows, 10);
        assert_eq!(options.max_pages, 500);
    }

    #[test]
    fn test_scan_options_deserialize_millis_with_defaults() {
        let options: ScanOptions =
            serde_json::from_str(r#"{"optimize_pagination": true, "settle_delay": 250}"#).unwrap();
        assert!(options.optimize_pagination);
        assert_eq!(options.settle_delay, Duration::from_millis(250));
        assert_eq!(options.repaginate_settle_delay, DEFAULT_REPAGINATE_SETTLE_DELAY);
    }

    #[test]
    fn test_running_guard_rejects_second_acquire_and_releases_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = RunningGuard::acquire(&flag).unwrap();
        assert!(matches!(
            RunningGuard::acquire(&flag),
            Err(ScanError::AlreadyRunning)
        ));
        drop(guard);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(RunningGuard::acquire(&flag).is_ok());
    }

    #[test]
    fn test_traversal_merge_drops_duplicate_ids() {
        let mut traversal = Traversal::default();
        let doc = crate::document::tests::sample_document("dup", 0);
        assert_eq!(traversal.merge(vec![doc.clone(), doc.clone()]), 1);
        assert_eq!(traversal.merge(vec![doc]), 0);
        assert_eq!(traversal.documents.len(), 1);
    }

    #[test]
    fn test_report_summary_reflects_traversal() {
        let mut traversal = Traversal::default();
        traversal.merge(vec![crate::document::tests::sample_document("a", 0)]);
        traversal.pages_processed = 1;
        traversal.table_kind = Some(TableKind::Received);
        let report = traversal.into_report(Some(ScanError::TableNotFound));

        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("no documents table found on the page"));
        let summary = report.summary();
        assert_eq!(summary.documents_found, 1);
        assert_eq!(summary.pages_processed, 1);
        assert_eq!(summary.table_kind, Some(TableKind::Received));
    }
}
