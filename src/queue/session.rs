//! Serializable snapshot of a queue run.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::DownloadJob;
use crate::document::DocumentFormat;

/// Accounting of a queue run, persisted under
/// [`keys::DOWNLOAD_SESSION`](crate::store::keys::DOWNLOAD_SESSION).
///
/// `pending_jobs` holds the unfinished jobs themselves (including the ones in
/// flight when the snapshot was taken) so a restored queue can continue them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSession {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DocumentFormat>,
    pub total: usize,
    pub completed_ids: Vec<String>,
    pub failed_jobs: Vec<DownloadJob>,
    pub pending_ids: Vec<String>,
    pub pending_jobs: Vec<DownloadJob>,
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub saved_at: DateTime<Utc>,
}

impl DownloadSession {
    /// Whether the run left nothing to do.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pending_jobs.is_empty()
    }
}

/// `dl-<utc timestamp>-<random hex>`.
pub(crate) fn new_session_id() -> String {
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("dl-{}-{suffix:08x}", Utc::now().format("%Y%m%dT%H%M%S"))
}
