//! Typed form body for the portal's per-row download request.
//!
//! The portal expects the form id marker, the current filter set, the state
//! token, and a synthetic link key naming the clicked row and format. Pairs
//! are emitted in that order and serialized by [`DownloadRequest::encode`].

use crate::document::{DocumentFormat, FORM_ID, TableKind};
use crate::page::html::STATE_TOKEN_FIELD;

/// Ordered key/value pairs of one download POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pairs: Vec<(String, String)>,
}

impl DownloadRequest {
    /// Starts a request for a row of `kind` in `format`.
    #[must_use]
    pub fn builder(kind: TableKind, format: DocumentFormat) -> DownloadRequestBuilder {
        DownloadRequestBuilder {
            kind,
            format,
            state_token: String::new(),
            filters: Vec::new(),
            row_index: 0,
        }
    }

    /// Builds the link key `frmPrincipal:<table>:<row>:lnk<Format>`.
    #[must_use]
    pub fn link_key(kind: TableKind, format: DocumentFormat, row_index: usize) -> String {
        format!(
            "{FORM_ID}:{}:{row_index}:lnk{}",
            kind.table_id(),
            format.link_suffix()
        )
    }

    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Returns the value of the first pair named `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serializes the pairs as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }
}

/// Builder for [`DownloadRequest`].
#[derive(Debug, Clone)]
pub struct DownloadRequestBuilder {
    kind: TableKind,
    format: DocumentFormat,
    state_token: String,
    filters: Vec<(String, String)>,
    row_index: usize,
}

impl DownloadRequestBuilder {
    #[must_use]
    pub fn state_token(mut self, token: impl Into<String>) -> Self {
        self.state_token = token.into();
        self
    }

    /// Filter parameters; the form marker and state token are always emitted
    /// by the builder, so same-named filters are dropped.
    #[must_use]
    pub fn filters<I, K, V>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.filters = filters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn row_index(mut self, row_index: usize) -> Self {
        self.row_index = row_index;
        self
    }

    #[must_use]
    pub fn build(self) -> DownloadRequest {
        let link = DownloadRequest::link_key(self.kind, self.format, self.row_index);
        let mut pairs = Vec::with_capacity(self.filters.len() + 3);

        pairs.push((FORM_ID.to_string(), FORM_ID.to_string()));
        pairs.extend(
            self.filters
                .into_iter()
                .filter(|(name, _)| name != FORM_ID && name != STATE_TOKEN_FIELD && *name != link),
        );
        pairs.push((STATE_TOKEN_FIELD.to_string(), self.state_token));
        pairs.push((link.clone(), link));

        DownloadRequest { pairs }
    }
}
