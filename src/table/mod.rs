//! Document table scanning.
//!
//! - [`HeaderMapper`] resolves column meaning from header labels
//! - [`TableScanner`] detects the rendered table kind and converts rows to
//!   [`Document`](crate::document::Document)s
//! - [`parse`] holds the cell text conversions

mod error;
pub mod header;
pub mod parse;
mod scanner;

pub use error::ScanError;
pub use header::{HeaderKey, HeaderMap, HeaderMapper};
pub use parse::{format_date, format_date_time, parse_currency, split_numero, split_ruc_razon_social};
pub use scanner::{MIN_ROW_CELLS, PageExtraction, ROW_RETRY_LIMIT, TableScanner};
