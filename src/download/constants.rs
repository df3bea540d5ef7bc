//! Constants for the download module (timeouts, response classification).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// HTML bodies below this size that show a login form are a session redirect.
pub const LOGIN_PAGE_MAX_BYTES: usize = 20_000;

/// Content types treated as a document payload.
pub const PAYLOAD_CONTENT_TYPES: [&str; 6] = [
    "application/pdf",
    "application/xml",
    "text/xml",
    "application/octet-stream",
    "application/zip",
    "application/force-download",
];
