//! Error types for page accessor operations.

use thiserror::Error;

/// Errors raised while reading or driving the host page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    /// The element was re-rendered or not ready; an in-place retry may succeed.
    #[error("transient page error during {operation}: {message}")]
    Transient {
        /// Operation that failed.
        operation: &'static str,
        /// Detail from the accessor.
        message: String,
    },

    /// A control or element the operation needs is not present.
    #[error("{what} is not available on the page")]
    Unavailable {
        /// Description of the missing element.
        what: String,
    },

    /// Markup could not be interpreted.
    #[error("failed to parse page markup: {message}")]
    Parse {
        /// Detail about the parse failure.
        message: String,
    },
}

impl PageError {
    /// Creates a transient error.
    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            operation,
            message: message.into(),
        }
    }

    /// Creates an unavailable-element error.
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable { what: what.into() }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether retrying the same call in place is worthwhile.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_display_and_flag() {
        let error = PageError::transient("row_at", "stale row");
        assert!(error.is_transient());
        assert!(error.to_string().contains("row_at"));
        assert!(error.to_string().contains("stale row"));
    }

    #[test]
    fn test_unavailable_is_not_transient() {
        let error = PageError::unavailable("next control");
        assert!(!error.is_transient());
        assert_eq!(error.to_string(), "next control is not available on the page");
    }
}
