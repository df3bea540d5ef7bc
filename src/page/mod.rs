//! Page accessor capability over the portal's rendered documents page.
//!
//! Scanning and pagination never touch markup directly. They go through the
//! narrow [`PageAccessor`] trait so that the engine can run against a live
//! session, captured HTML ([`HtmlSnapshotPage`]), or a test fake.

mod error;
pub mod html;

pub use error::PageError;
pub use html::HtmlSnapshotPage;

use async_trait::async_trait;

use crate::document::TableKind;

/// Opaque reference to a located table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    /// Which table kind was found.
    pub kind: TableKind,
    /// Element id of the table on the page.
    pub element_id: String,
}

impl TableHandle {
    /// Creates a handle for a table element.
    pub fn new(kind: TableKind, element_id: impl Into<String>) -> Self {
        Self {
            kind,
            element_id: element_id.into(),
        }
    }
}

/// Text content of one rendered table row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableRow {
    /// Stable row-identifying attribute (`data-ri`), when rendered.
    pub key: Option<String>,
    /// Cell texts in column order; line breaks inside a cell are kept as `\n`.
    pub cells: Vec<String>,
}

impl TableRow {
    /// Creates a row from its key and cells.
    pub fn new(key: Option<&str>, cells: Vec<String>) -> Self {
        Self {
            key: key.map(str::to_string),
            cells,
        }
    }
}

/// Operations the engine needs from the host page.
///
/// Implementations must be cheap to call repeatedly; the scanner re-reads
/// rows and the executor re-reads the state token before every request.
#[async_trait]
pub trait PageAccessor: Send + Sync {
    /// Locates the table of the given kind, if it is rendered.
    async fn find_table(&self, kind: TableKind) -> Result<Option<TableHandle>, PageError>;

    /// Returns the header cell texts of a table.
    async fn header_cells(&self, table: &TableHandle) -> Result<Vec<String>, PageError>;

    /// Number of physical rows currently rendered.
    async fn row_count(&self, table: &TableHandle) -> Result<usize, PageError>;

    /// Reads the physical row at `index`.
    async fn row_at(&self, table: &TableHandle, index: usize) -> Result<TableRow, PageError>;

    /// Re-locates a row by its stable key.
    async fn row_by_key(&self, table: &TableHandle, key: &str)
    -> Result<Option<TableRow>, PageError>;

    /// Paginator caption text such as `(2 of 7)`.
    async fn paginator_caption(&self) -> Result<Option<String>, PageError>;

    /// Whether the paginator's "next" control is disabled.
    async fn is_next_disabled(&self) -> Result<bool, PageError>;

    /// Triggers the "next page" control.
    async fn click_next(&self) -> Result<(), PageError>;

    /// Page sizes offered by the paginator's rows-per-page control.
    async fn page_size_options(&self) -> Result<Vec<u32>, PageError>;

    /// Selects a rows-per-page value.
    async fn set_page_size(&self, size: u32) -> Result<(), PageError>;

    /// Current server-side UI state token.
    async fn read_state_token(&self) -> Result<Option<String>, PageError>;

    /// Filter parameters the portal expects alongside a download request.
    async fn read_filter_params(&self, kind: TableKind)
    -> Result<Vec<(String, String)>, PageError>;
}
