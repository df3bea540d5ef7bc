//! Per-document download requests against the portal.
//!
//! - [`DownloadRequest`]: typed form body (state token, filters, link key)
//! - [`classify`]: ordered rule table for disguised HTML error pages
//! - [`DownloadJobExecutor`]: one POST, classified into a [`JobOutcome`]
//! - [`DownloadTrigger`]: host hand-off for payloads, with [`FileTrigger`]
//!   writing into a directory
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use comprobantes_core::document::{DocumentFormat, TableKind};
//! use comprobantes_core::download::{DownloadContext, DownloadJobExecutor, FileTrigger};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(doc: comprobantes_core::Document) -> Result<(), Box<dyn std::error::Error>> {
//! let executor = DownloadJobExecutor::new(
//!     "https://portal.example/comprobantes.jsf",
//!     Arc::new(FileTrigger::new("./descargas")),
//!     CancellationToken::new(),
//!     None,
//! )?;
//! let context = DownloadContext {
//!     state_token: "-4711:42".to_string(),
//!     table_kind: TableKind::Received,
//!     filter_params: Vec::new(),
//! };
//! let outcome = executor.execute(&doc, DocumentFormat::Xml, &context).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod classify;
mod constants;
mod error;
mod executor;
mod request;
mod trigger;

pub use classify::{HtmlClass, classify_html};
pub use constants::{CONNECT_TIMEOUT_SECS, LOGIN_PAGE_MAX_BYTES, READ_TIMEOUT_SECS};
pub use error::DownloadError;
pub use executor::{DownloadContext, DownloadJobExecutor, JobOutcome};
pub use request::{DownloadRequest, DownloadRequestBuilder};
pub use trigger::{DownloadTrigger, FileTrigger};
