//! One document's download request, classified into a [`JobOutcome`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::classify::{BodyKind, HtmlClass, body_kind, classify_html};
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::request::DownloadRequest;
use super::trigger::DownloadTrigger;
use super::DownloadError;
use crate::document::{Document, DocumentFormat, TableKind};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Portal state read immediately before a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadContext {
    pub state_token: String,
    pub table_kind: TableKind,
    pub filter_params: Vec<(String, String)>,
}

/// Result of one download attempt.
#[derive(Debug)]
pub enum JobOutcome {
    /// The payload reached the trigger.
    Downloaded { trigger_id: String },
    /// The portal session is gone; the shared abort token has been cancelled.
    SessionLost { reason: String },
    /// The portal reported this document as unavailable; retrying will not help.
    Skipped { reason: String },
    /// Worth retrying.
    Failed { error: DownloadError },
}

impl JobOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }
}

/// Issues the portal's download POST for one (document, format) pair.
///
/// Never retries and never returns an error: every failure is a
/// [`JobOutcome`] variant. Retrying is the queue's job.
#[derive(Clone)]
pub struct DownloadJobExecutor {
    client: Client,
    endpoint: Url,
    trigger: Arc<dyn DownloadTrigger>,
    abort: CancellationToken,
}

impl std::fmt::Debug for DownloadJobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadJobExecutor")
            .field("endpoint", &self.endpoint.as_str())
            .field("aborted", &self.abort.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl DownloadJobExecutor {
    /// Creates an executor with the default timeouts.
    ///
    /// `cookie_jar` carries the portal session cookies.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidEndpoint`] for a malformed URL or
    /// [`DownloadError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        trigger: Arc<dyn DownloadTrigger>,
        abort: CancellationToken,
        cookie_jar: Option<Arc<Jar>>,
    ) -> Result<Self, DownloadError> {
        let endpoint = parse_endpoint(endpoint)?;
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(concat!("comprobantes-downloader/", env!("CARGO_PKG_VERSION")));
        if let Some(jar) = cookie_jar {
            builder = builder.cookie_provider(jar);
        }
        let client = builder.build().map_err(DownloadError::ClientBuild)?;
        Ok(Self::with_client(client, endpoint, trigger, abort))
    }

    /// Creates an executor around an existing client.
    #[must_use]
    pub fn with_client(
        client: Client,
        endpoint: Url,
        trigger: Arc<dyn DownloadTrigger>,
        abort: CancellationToken,
    ) -> Self {
        Self {
            client,
            endpoint,
            trigger,
            abort,
        }
    }

    /// Same client and trigger, signalling session loss on `abort`.
    #[must_use]
    pub fn with_abort_token(&self, abort: CancellationToken) -> Self {
        Self {
            abort,
            ..self.clone()
        }
    }

    /// Token cancelled on session loss.
    #[must_use]
    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Requests `document` in `format` and classifies the response.
    #[instrument(skip_all, fields(document = %document.id, row = document.row_index, format = %format))]
    pub async fn execute(
        &self,
        document: &Document,
        format: DocumentFormat,
        context: &DownloadContext,
    ) -> JobOutcome {
        if context.state_token.is_empty() {
            return JobOutcome::Failed {
                error: DownloadError::missing_state_token(&document.id),
            };
        }

        let body = DownloadRequest::builder(context.table_kind, format)
            .state_token(context.state_token.as_str())
            .filters(context.filter_params.iter().cloned())
            .row_index(document.row_index)
            .build()
            .encode();

        let response = match self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE))
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return JobOutcome::Failed {
                    error: DownloadError::network(&document.id, e),
                };
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return self.session_lost(format!(
                "portal rejected the request with HTTP {}; sign in again",
                status.as_u16()
            ));
        }
        if !status.is_success() {
            return JobOutcome::Failed {
                error: DownloadError::http_status(&document.id, status.as_u16()),
            };
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return JobOutcome::Failed {
                    error: DownloadError::network(&document.id, e),
                };
            }
        };

        match body_kind(content_type.as_deref(), &bytes) {
            BodyKind::Payload => self.deliver(document, format, bytes.to_vec()).await,
            BodyKind::Html => self.classify_page(document, &bytes),
            BodyKind::Other => JobOutcome::Failed {
                error: DownloadError::unexpected_response(
                    &document.id,
                    content_type.unwrap_or_default(),
                    bytes.len(),
                ),
            },
        }
    }

    async fn deliver(&self, document: &Document, format: DocumentFormat, payload: Vec<u8>) -> JobOutcome {
        let filename = document.file_name(format);
        let size = payload.len();
        match self.trigger.trigger(payload, &filename).await {
            Ok(trigger_id) => {
                debug!(filename = %filename, bytes = size, "payload delivered");
                JobOutcome::Downloaded { trigger_id }
            }
            Err(error) => JobOutcome::Failed { error },
        }
    }

    fn classify_page(&self, document: &Document, bytes: &[u8]) -> JobOutcome {
        let html = String::from_utf8_lossy(bytes);
        let class = classify_html(&html);
        match class {
            HtmlClass::SessionExpired | HtmlClass::LoginRequired => {
                self.session_lost(class.user_message().to_string())
            }
            HtmlClass::NotFound | HtmlClass::ServerError => {
                info!(class = ?class, "portal returned an error page; skipping document");
                JobOutcome::Skipped {
                    reason: class.user_message().to_string(),
                }
            }
            HtmlClass::Unrecognized => {
                warn!(bytes = bytes.len(), "unrecognized HTML response");
                JobOutcome::Failed {
                    error: DownloadError::unexpected_response(&document.id, "text/html", bytes.len()),
                }
            }
        }
    }

    fn session_lost(&self, reason: String) -> JobOutcome {
        if !self.abort.is_cancelled() {
            warn!(reason = %reason, "session lost; aborting remaining downloads");
        }
        self.abort.cancel();
        JobOutcome::SessionLost { reason }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, DownloadError> {
    let url = Url::parse(endpoint).map_err(|_| DownloadError::invalid_endpoint(endpoint))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(DownloadError::invalid_endpoint(endpoint)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::FileTrigger;

    #[test]
    fn test_parse_endpoint_rejects_non_http() {
        assert!(parse_endpoint("https://srienlinea.example/comprobantes.jsf").is_ok());
        assert!(matches!(
            parse_endpoint("ftp://example.com/x"),
            Err(DownloadError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            parse_endpoint("not a url"),
            Err(DownloadError::InvalidEndpoint { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_state_token_fails_without_request() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let executor = DownloadJobExecutor::new(
            "http://127.0.0.1:9/never",
            Arc::new(FileTrigger::new(temp_dir.path())),
            CancellationToken::new(),
            None,
        )
        .unwrap();
        let document = crate::document::tests::sample_document("0503", 0);
        let context = DownloadContext {
            state_token: String::new(),
            table_kind: TableKind::Received,
            filter_params: Vec::new(),
        };

        let outcome = executor.execute(&document, DocumentFormat::Xml, &context).await;
        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                error: DownloadError::MissingStateToken { .. }
            }
        ));
        assert!(!executor.abort_token().is_cancelled());
    }
}
