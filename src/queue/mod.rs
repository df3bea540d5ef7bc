//! Batched download scheduling with retry and session snapshots.
//!
//! A [`DownloadQueue`] owns the jobs built from a document selection. It
//! releases them in batches of `batch_size`; inside a batch at most
//! `concurrency` jobs run at once and batches never overlap. Failed attempts
//! go through the [`RetryPolicy`]. Two stop signals exist:
//!
//! - user cancellation or pause, checked between batches (the current batch
//!   finishes)
//! - session loss, a shared [`CancellationToken`] checked before every job
//!   start and every retry
//!
//! Jobs stopped by a session loss go back to the pending set, so a saved
//! [`DownloadSession`] can be restored and continued after signing in again.

mod config;
mod error;
mod job;
mod progress;
mod retry;
mod session;

pub use config::QueueConfig;
pub use error::QueueError;
pub use job::{DownloadJob, JobStatus};
pub use progress::QueueProgress;
pub use retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_MAX_RETRY_DELAY, DEFAULT_RETRY_DELAY, FailureType, RetryDecision,
    RetryPolicy,
};
pub use session::DownloadSession;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::document::{Document, DocumentFormat};
use crate::download::JobOutcome;
use crate::store::{KeyValueStore, keys, load_json, save_json};

/// Runs one attempt of a job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &DownloadJob) -> JobOutcome;
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// No pending jobs left.
    Finished,
    Cancelled,
    /// The portal session was lost; pending jobs were left untouched.
    SessionLost,
    Paused,
}

/// Final tallies of a run.
///
/// `completed + failed + skipped + not_attempted == total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSummary {
    pub completed: usize,
    /// Failed after exhausting retries.
    pub failed: usize,
    /// Reported unavailable by the portal.
    pub skipped: usize,
    /// Still pending when the run stopped.
    pub not_attempted: usize,
    pub total: usize,
    pub outcome: RunOutcome,
    /// User-facing message when the session was lost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_lost_reason: Option<String>,
}

type ProgressListener = Box<dyn Fn(&QueueProgress) + Send + Sync>;

#[derive(Debug, Default)]
struct QueueState {
    session_id: String,
    format: Option<DocumentFormat>,
    total: usize,
    pending: VecDeque<DownloadJob>,
    /// Copies of the jobs of the running batch, for snapshots.
    in_flight: Vec<DownloadJob>,
    completed_ids: Vec<String>,
    /// Jobs completed by this queue; restored sessions only carry their ids.
    completed: Vec<DownloadJob>,
    failed: Vec<DownloadJob>,
    current_batch: usize,
    total_batches: usize,
    started_at: Option<DateTime<Utc>>,
    clock_start: Option<Instant>,
    finals_since_save: usize,
    session_lost_reason: Option<String>,
}

impl QueueState {
    fn progress(&self) -> QueueProgress {
        let elapsed = self.clock_start.map_or(Duration::ZERO, |start| start.elapsed());
        QueueProgress {
            current_batch: self.current_batch,
            total_batches: self.total_batches,
            completed_docs: self.completed_ids.len(),
            failed_docs: self.failed.len(),
            pending_docs: self.pending.len() + self.in_flight.len(),
            ..QueueProgress::default()
        }
        .with_rates(elapsed)
    }

    fn session(&self, paused: bool) -> DownloadSession {
        let pending_jobs: Vec<DownloadJob> = self
            .in_flight
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect();
        DownloadSession {
            session_id: self.session_id.clone(),
            format: self.format,
            total: self.total,
            completed_ids: self.completed_ids.clone(),
            failed_jobs: self.failed.clone(),
            pending_ids: pending_jobs.iter().map(|job| job.id().to_string()).collect(),
            pending_jobs,
            paused,
            started_at: self.started_at,
            saved_at: Utc::now(),
        }
    }

    fn summary(&self, outcome: RunOutcome) -> DownloadSummary {
        let skipped = self.failed.iter().filter(|job| job.skipped).count();
        DownloadSummary {
            completed: self.completed_ids.len(),
            failed: self.failed.len() - skipped,
            skipped,
            not_attempted: self.pending.len() + self.in_flight.len(),
            total: self.total,
            outcome,
            session_lost_reason: self.session_lost_reason.clone(),
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Schedules download jobs in sequential batches.
pub struct DownloadQueue {
    config: QueueConfig,
    policy: RetryPolicy,
    semaphore: Semaphore,
    store: Option<Arc<dyn KeyValueStore>>,
    abort: CancellationToken,
    state: Mutex<QueueState>,
    paused: AtomicBool,
    cancelled: AtomicBool,
    running: AtomicBool,
    listeners: Vec<ProgressListener>,
}

impl std::fmt::Debug for DownloadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadQueue")
            .field("config", &self.config)
            .field("paused", &self.paused.load(Ordering::SeqCst))
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .field("aborted", &self.abort.is_cancelled())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl DownloadQueue {
    /// Creates an empty queue; `abort` is the session-loss signal shared with
    /// the executor.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: QueueConfig, abort: CancellationToken) -> Result<Self, QueueError> {
        config.validate()?;
        Ok(Self {
            policy: config.retry_policy(),
            semaphore: Semaphore::new(config.concurrency),
            config,
            store: None,
            abort,
            state: Mutex::new(QueueState::default()),
            paused: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            running: AtomicBool::new(false),
            listeners: Vec::new(),
        })
    }

    /// Persists session snapshots into `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers a listener called after every batch start and job completion.
    pub fn on_progress<F>(&mut self, listener: F)
    where
        F: Fn(&QueueProgress) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    #[must_use]
    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    /// Replaces the queue contents with one pending job per document.
    ///
    /// Documents sharing an id are queued once.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyRunning`] while a run is in progress.
    pub async fn initialize_queue(
        &self,
        documents: Vec<Document>,
        format: DocumentFormat,
    ) -> Result<(), QueueError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(QueueError::AlreadyRunning);
        }

        let mut seen = HashSet::new();
        let pending: VecDeque<DownloadJob> = documents
            .into_iter()
            .filter(|doc| seen.insert(doc.id.clone()))
            .map(|doc| DownloadJob::new(doc, format))
            .collect();

        let mut state = self.state.lock().await;
        *state = QueueState {
            session_id: session::new_session_id(),
            format: Some(format),
            total: pending.len(),
            total_batches: self.config.batches_for(pending.len()),
            pending,
            ..QueueState::default()
        };
        self.paused.store(false, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
        info!(
            session = %state.session_id,
            jobs = state.total,
            format = %format,
            "download queue initialized"
        );
        Ok(())
    }

    /// Rebuilds the queue from a saved session so its pending jobs can continue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyRunning`] while a run is in progress.
    pub async fn restore(&self, session: DownloadSession) -> Result<(), QueueError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(QueueError::AlreadyRunning);
        }

        let pending: VecDeque<DownloadJob> = session
            .pending_jobs
            .into_iter()
            .map(|mut job| {
                job.mark_pending(None);
                job
            })
            .collect();

        let mut state = self.state.lock().await;
        *state = QueueState {
            session_id: session.session_id,
            format: session.format,
            total: session.completed_ids.len() + session.failed_jobs.len() + pending.len(),
            total_batches: self.config.batches_for(pending.len()),
            pending,
            completed_ids: session.completed_ids,
            failed: session.failed_jobs,
            started_at: session.started_at,
            ..QueueState::default()
        };
        self.paused.store(session.paused, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
        info!(
            session = %state.session_id,
            pending = state.pending.len(),
            completed = state.completed_ids.len(),
            "download queue restored"
        );
        Ok(())
    }

    /// Stops scheduling after the current batch; resumable.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stops scheduling after the current batch.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn progress(&self) -> QueueProgress {
        self.state.lock().await.progress()
    }

    /// Current accounting as a serializable session.
    pub async fn snapshot(&self) -> DownloadSession {
        self.state.lock().await.session(self.is_paused())
    }

    /// Jobs completed since the queue was initialized or restored.
    pub async fn completed_jobs(&self) -> Vec<DownloadJob> {
        self.state.lock().await.completed.clone()
    }

    /// Jobs that ended in the failed list, skipped ones included.
    pub async fn failed_jobs(&self) -> Vec<DownloadJob> {
        self.state.lock().await.failed.clone()
    }

    /// Writes the current session snapshot to the store, if one is attached.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] if the store write fails.
    pub async fn save_progress(&self) -> Result<(), QueueError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let session = self.snapshot().await;
        save_json(store.as_ref(), keys::DOWNLOAD_SESSION, &session).await?;
        debug!(session = %session.session_id, "download session saved");
        Ok(())
    }

    /// Reads the last saved session from the store.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] if the read fails or the value is malformed.
    pub async fn load_progress(&self) -> Result<Option<DownloadSession>, QueueError> {
        match &self.store {
            Some(store) => Ok(load_json(store.as_ref(), keys::DOWNLOAD_SESSION).await?),
            None => Ok(None),
        }
    }

    /// Runs batches until nothing is pending or a stop signal is seen.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyRunning`] if another run is in progress,
    /// or [`QueueError::Store`] if the final snapshot cannot be saved.
    #[instrument(skip_all)]
    pub async fn process_queue(&self, runner: &dyn JobRunner) -> Result<DownloadSummary, QueueError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        {
            let mut state = self.state.lock().await;
            state.clock_start = Some(Instant::now());
            state.started_at.get_or_insert_with(Utc::now);
        }

        let outcome = loop {
            if let Some(outcome) = self.stop_reason().await {
                break outcome;
            }

            let batch = self.next_batch().await;
            let batch_len = batch.len();
            join_all(batch.into_iter().map(|job| self.run_job(job, runner))).await;
            debug!(jobs = batch_len, "batch finished");

            if self.stop_reason().await.is_none() && !self.config.delay_between_batches.is_zero() {
                tokio::time::sleep(self.config.delay_between_batches).await;
            }
        };

        self.save_progress().await?;
        let summary = self.state.lock().await.summary(outcome);
        info!(
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            not_attempted = summary.not_attempted,
            outcome = ?summary.outcome,
            "download run ended"
        );
        Ok(summary)
    }

    async fn stop_reason(&self) -> Option<RunOutcome> {
        if self.state.lock().await.pending.is_empty() {
            Some(RunOutcome::Finished)
        } else if self.abort.is_cancelled() {
            Some(RunOutcome::SessionLost)
        } else if self.is_cancelled() {
            Some(RunOutcome::Cancelled)
        } else if self.is_paused() {
            Some(RunOutcome::Paused)
        } else {
            None
        }
    }

    async fn next_batch(&self) -> Vec<DownloadJob> {
        let mut state = self.state.lock().await;
        let take = self.config.batch_size.min(state.pending.len());
        let batch: Vec<DownloadJob> = state.pending.drain(..take).collect();
        state.in_flight.extend(batch.iter().cloned());
        state.current_batch += 1;
        state.total_batches = state
            .total_batches
            .max(state.current_batch + self.config.batches_for(state.pending.len()));

        info!(
            batch = state.current_batch,
            total_batches = state.total_batches,
            jobs = batch.len(),
            "starting batch"
        );
        self.notify(&state.progress());
        batch
    }

    async fn run_job(&self, mut job: DownloadJob, runner: &dyn JobRunner) {
        let Ok(_permit) = self.semaphore.acquire().await else {
            self.settle(job).await;
            return;
        };

        loop {
            if self.abort.is_cancelled() {
                debug!(document = %job.id(), "session lost; job left pending");
                job.mark_pending(None);
                break;
            }

            job.mark_processing();
            let (failure, message) = match runner.run(&job).await {
                JobOutcome::Downloaded { trigger_id } => {
                    debug!(document = %job.id(), retry_count = job.retry_count, "job completed");
                    job.mark_completed(trigger_id);
                    break;
                }
                JobOutcome::SessionLost { reason } => (FailureType::SessionLost, reason),
                JobOutcome::Skipped { reason } => (FailureType::Skip, reason),
                JobOutcome::Failed { error } => (FailureType::Transient, error.to_string()),
            };

            match self.policy.should_retry(failure, job.retry_count) {
                RetryDecision::Retry { delay, retry_count } => {
                    warn!(
                        document = %job.id(),
                        retry_count,
                        delay_ms = delay.as_millis(),
                        error = %message,
                        "download attempt failed; retrying"
                    );
                    job.mark_retrying(retry_count, message);
                    self.track_in_flight(&job).await;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    match failure {
                        FailureType::SessionLost => {
                            self.note_session_loss(&message).await;
                            job.mark_pending(Some(message));
                        }
                        FailureType::Skip => {
                            info!(document = %job.id(), reason = %message, "document skipped");
                            job.mark_failed(message, true);
                        }
                        FailureType::Transient => {
                            warn!(document = %job.id(), error = %message, %reason, "download failed");
                            job.mark_failed(message, false);
                        }
                    }
                    break;
                }
            }
        }

        self.settle(job).await;
    }

    async fn note_session_loss(&self, reason: &str) {
        self.abort.cancel();
        let mut state = self.state.lock().await;
        state.session_lost_reason.get_or_insert_with(|| reason.to_string());
    }

    async fn track_in_flight(&self, job: &DownloadJob) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.in_flight.iter_mut().find(|j| j.id() == job.id()) {
            slot.clone_from(job);
        }
    }

    /// Moves a job out of the in-flight set into its final list.
    async fn settle(&self, job: DownloadJob) {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.in_flight.retain(|j| j.id() != job.id());
            match job.status {
                JobStatus::Completed => {
                    state.completed_ids.push(job.id().to_string());
                    state.completed.push(job);
                    state.finals_since_save += 1;
                }
                JobStatus::Failed => {
                    state.failed.push(job);
                    state.finals_since_save += 1;
                }
                JobStatus::Pending | JobStatus::Processing | JobStatus::Retrying => {
                    state.pending.push_back(job);
                }
            }
            self.notify(&state.progress());

            if state.finals_since_save >= self.config.progress_save_interval {
                state.finals_since_save = 0;
                Some(state.session(self.is_paused()))
            } else {
                None
            }
        };

        if let (Some(session), Some(store)) = (snapshot, &self.store)
            && let Err(e) = save_json(store.as_ref(), keys::DOWNLOAD_SESSION, &session).await
        {
            warn!(error = %e, "failed to save download session");
        }
    }

    fn notify(&self, progress: &QueueProgress) {
        for listener in &self.listeners {
            listener(progress);
        }
    }
}
