//! Download job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentFormat};

/// Lifecycle of a [`DownloadJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    /// Waiting out a backoff delay.
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job reached a final state.
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One (document, format) pair owned by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub document: Document,
    pub format: DocumentFormat,
    pub status: JobStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Last failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed because the portal reported the document unavailable.
    #[serde(default)]
    pub skipped: bool,
    /// Identifier returned by the download trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
}

impl DownloadJob {
    #[must_use]
    pub fn new(document: Document, format: DocumentFormat) -> Self {
        Self {
            document,
            format,
            status: JobStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            skipped: false,
            trigger_id: None,
        }
    }

    /// Document id; unique within a queue.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at.get_or_insert_with(Utc::now);
    }

    pub(crate) fn mark_retrying(&mut self, retry_count: u32, error: String) {
        self.status = JobStatus::Retrying;
        self.retry_count = retry_count;
        self.error = Some(error);
    }

    pub(crate) fn mark_completed(&mut self, trigger_id: String) {
        self.status = JobStatus::Completed;
        self.document.attach_verification(self.format, true);
        self.trigger_id = Some(trigger_id);
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error: String, skipped: bool) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.skipped = skipped;
        self.finished_at = Some(Utc::now());
    }

    /// Returns the job to the pending set without losing its retry count.
    pub(crate) fn mark_pending(&mut self, error: Option<String>) {
        self.status = JobStatus::Pending;
        if error.is_some() {
            self.error = error;
        }
    }
}
