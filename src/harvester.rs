//! Entry point tying the scan and download halves together.
//!
//! A [`Harvester`] is built once per portal page and passed to whatever
//! handles user requests. It owns the pagination driver and the download
//! executor and keeps track of the running download so it can be cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::document::{Document, DocumentFormat};
use crate::download::{DownloadContext, DownloadError, DownloadJobExecutor, JobOutcome};
use crate::page::PageAccessor;
use crate::pagination::{CurrentPageScan, PaginationDriver, ScanOptions, ScanProgress, ScanReport};
use crate::queue::{
    DownloadJob, DownloadQueue, DownloadSummary, JobRunner, QueueConfig, QueueError, QueueProgress,
};
use crate::store::KeyValueStore;
use crate::table::ScanError;

/// Reads the portal context right before each attempt, then downloads.
struct PortalRunner {
    page: Arc<dyn PageAccessor>,
    executor: DownloadJobExecutor,
}

impl PortalRunner {
    async fn context(&self, document: &Document) -> Result<DownloadContext, DownloadError> {
        let kind = document.table_kind;
        let state_token = self
            .page
            .read_state_token()
            .await
            .map_err(|e| DownloadError::page_state(&document.id, e))?
            .ok_or_else(|| DownloadError::missing_state_token(&document.id))?;
        let filter_params = self
            .page
            .read_filter_params(kind)
            .await
            .map_err(|e| DownloadError::page_state(&document.id, e))?;
        Ok(DownloadContext {
            state_token,
            table_kind: kind,
            filter_params,
        })
    }
}

#[async_trait]
impl JobRunner for PortalRunner {
    async fn run(&self, job: &DownloadJob) -> JobOutcome {
        match self.context(&job.document).await {
            Ok(context) => self.executor.execute(&job.document, job.format, &context).await,
            Err(error) => JobOutcome::Failed { error },
        }
    }
}

/// Scan and download operations over one portal page.
pub struct Harvester {
    page: Arc<dyn PageAccessor>,
    store: Arc<dyn KeyValueStore>,
    driver: PaginationDriver,
    executor: DownloadJobExecutor,
    queue_config: QueueConfig,
    active: Mutex<Option<Arc<DownloadQueue>>>,
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("driver", &self.driver)
            .field("executor", &self.executor)
            .field("queue_config", &self.queue_config)
            .finish_non_exhaustive()
    }
}

impl Harvester {
    /// Creates a harvester; `executor`'s abort token is replaced on every run.
    #[must_use]
    pub fn new(
        page: Arc<dyn PageAccessor>,
        store: Arc<dyn KeyValueStore>,
        executor: DownloadJobExecutor,
    ) -> Self {
        Self {
            driver: PaginationDriver::new(Arc::clone(&page), Arc::clone(&store)),
            page,
            store,
            executor,
            queue_config: QueueConfig::default(),
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_queue_config(mut self, config: QueueConfig) -> Self {
        self.queue_config = config;
        self
    }

    /// Scan progress updates.
    #[must_use]
    pub fn subscribe_scan(&self) -> watch::Receiver<ScanProgress> {
        self.driver.subscribe()
    }

    /// Extracts the documents of the page currently shown.
    ///
    /// # Errors
    ///
    /// See [`PaginationDriver::scan_current_page`].
    pub async fn scan_current_page(&self) -> Result<CurrentPageScan, ScanError> {
        self.driver.scan_current_page().await
    }

    /// Walks every page and returns the aggregated documents.
    ///
    /// # Errors
    ///
    /// See [`PaginationDriver::scan_all_pages`].
    pub async fn scan_all_pages(&self, options: &ScanOptions) -> Result<ScanReport, ScanError> {
        self.driver.scan_all_pages(options).await
    }

    /// Downloads `documents` in `format`, reporting progress to `on_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyRunning`] if a download is in progress, or
    /// a config or store error from the queue.
    #[instrument(skip_all, fields(documents = documents.len(), format = %format))]
    pub async fn download_selected<F>(
        &self,
        documents: Vec<Document>,
        format: DocumentFormat,
        on_progress: F,
    ) -> Result<DownloadSummary, QueueError>
    where
        F: Fn(&QueueProgress) + Send + Sync + 'static,
    {
        let queue = self.new_queue(on_progress)?;
        queue.initialize_queue(documents, format).await?;
        self.run(queue).await
    }

    /// Continues the download session saved in the store, if any.
    ///
    /// # Errors
    ///
    /// Same as [`Harvester::download_selected`], plus store read errors.
    #[instrument(skip_all)]
    pub async fn resume_download<F>(&self, on_progress: F) -> Result<Option<DownloadSummary>, QueueError>
    where
        F: Fn(&QueueProgress) + Send + Sync + 'static,
    {
        let queue = self.new_queue(on_progress)?;
        let Some(session) = queue.load_progress().await? else {
            info!("no saved download session");
            return Ok(None);
        };
        if session.is_finished() {
            info!(session = %session.session_id, "saved download session has nothing pending");
            return Ok(None);
        }
        queue.restore(session).await?;
        queue.resume();
        self.run(queue).await.map(Some)
    }

    /// Stops the running download after its current batch.
    ///
    /// Returns `false` when no download is running.
    pub async fn cancel_download(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(queue) => {
                info!("download cancellation requested");
                queue.cancel();
                true
            }
            None => false,
        }
    }

    fn new_queue<F>(&self, on_progress: F) -> Result<DownloadQueue, QueueError>
    where
        F: Fn(&QueueProgress) + Send + Sync + 'static,
    {
        let mut queue = DownloadQueue::new(self.queue_config.clone(), CancellationToken::new())?
            .with_store(Arc::clone(&self.store));
        queue.on_progress(on_progress);
        Ok(queue)
    }

    async fn run(&self, queue: DownloadQueue) -> Result<DownloadSummary, QueueError> {
        let queue = Arc::new(queue);
        {
            let mut active = self.active.lock().await;
            if active.is_some() {
                return Err(QueueError::AlreadyRunning);
            }
            *active = Some(Arc::clone(&queue));
        }

        let runner = PortalRunner {
            page: Arc::clone(&self.page),
            executor: self.executor.with_abort_token(queue.abort_token().clone()),
        };
        let result = queue.process_queue(&runner).await;
        *self.active.lock().await = None;
        result
    }
}
