//! Error types for the download module.
//!
//! Structured errors for portal requests and payload delivery, carrying the
//! context (document, path) needed for diagnostics.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching or delivering a document.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {document}: {source}")]
    Network {
        /// Document id being requested.
        document: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {document}")]
    Timeout {
        /// Document id being requested.
        document: String,
    },

    /// Non-success HTTP status other than a session loss.
    #[error("HTTP {status} requesting {document}")]
    HttpStatus {
        /// Document id being requested.
        document: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The response was neither a payload nor a recognizable portal page.
    #[error("unexpected {content_type} response ({bytes} bytes) for {document}")]
    UnexpectedResponse {
        /// Document id being requested.
        document: String,
        /// Reported content type.
        content_type: String,
        /// Body size.
        bytes: usize,
    },

    /// No state token could be read from the page before the request.
    #[error("no state token available for {document}")]
    MissingStateToken {
        /// Document id being requested.
        document: String,
    },

    /// The page could not provide the request context.
    #[error("failed to read portal state for {document}: {source}")]
    PageState {
        /// Document id being requested.
        document: String,
        /// The underlying page error.
        #[source]
        source: crate::page::PageError,
    },

    /// The portal endpoint URL is malformed.
    #[error("invalid portal endpoint: {url}")]
    InvalidEndpoint {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// File system error while delivering a payload.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, mapping timeouts.
    pub fn network(document: impl Into<String>, source: reqwest::Error) -> Self {
        let document = document.into();
        if source.is_timeout() {
            Self::Timeout { document }
        } else {
            Self::Network { document, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(document: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            document: document.into(),
            status,
        }
    }

    /// Creates an unexpected-response error.
    pub fn unexpected_response(
        document: impl Into<String>,
        content_type: impl Into<String>,
        bytes: usize,
    ) -> Self {
        Self::UnexpectedResponse {
            document: document.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Creates a missing-state-token error.
    pub fn missing_state_token(document: impl Into<String>) -> Self {
        Self::MissingStateToken {
            document: document.into(),
        }
    }

    /// Creates a page state error.
    pub fn page_state(document: impl Into<String>, source: crate::page::PageError) -> Self {
        Self::PageState {
            document: document.into(),
            source,
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>) -> Self {
        Self::InvalidEndpoint { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
