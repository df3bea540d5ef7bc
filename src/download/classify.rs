//! Response classification for download requests.
//!
//! The portal answers a failed download with a 200 HTML page instead of an
//! error status, so HTML bodies are matched against [`RULES`] in order.

use super::constants::{LOGIN_PAGE_MAX_BYTES, PAYLOAD_CONTENT_TYPES};

/// What an HTML response means for the job that received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlClass {
    SessionExpired,
    LoginRequired,
    NotFound,
    ServerError,
    Unrecognized,
}

impl HtmlClass {
    /// Whether this page means the portal session is gone.
    #[must_use]
    pub fn is_session_loss(self) -> bool {
        matches!(self, Self::SessionExpired | Self::LoginRequired)
    }

    /// Message shown to the user for this class.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::SessionExpired => "portal session expired; sign in again and restart the download",
            Self::LoginRequired => "portal redirected to the login page; sign in again",
            Self::NotFound => "document not available on the portal",
            Self::ServerError => "portal reported an internal error for this document",
            Self::Unrecognized => "unrecognized portal response",
        }
    }
}

/// One entry of the classification table.
#[derive(Debug)]
pub struct HtmlRule {
    pub class: HtmlClass,
    /// Lowercase phrases; any one of them matches.
    pub phrases: &'static [&'static str],
    /// Only bodies shorter than this match.
    pub max_body_len: Option<usize>,
}

impl HtmlRule {
    fn matches(&self, lowered: &str, body_len: usize) -> bool {
        self.max_body_len.is_none_or(|max| body_len < max)
            && self.phrases.iter().any(|phrase| lowered.contains(phrase))
    }
}

/// Ordered rules; the first match wins.
pub const RULES: &[HtmlRule] = &[
    HtmlRule {
        class: HtmlClass::SessionExpired,
        phrases: &[
            "sesión ha expirado",
            "sesion ha expirado",
            "sesión expirada",
            "sesion expirada",
            "session expired",
            "viewexpiredexception",
        ],
        max_body_len: None,
    },
    HtmlRule {
        class: HtmlClass::LoginRequired,
        phrases: &[
            "iniciar sesión",
            "iniciar sesion",
            "type=\"password\"",
            "name=\"password\"",
            "j_username",
            "kc-form-login",
        ],
        max_body_len: Some(LOGIN_PAGE_MAX_BYTES),
    },
    HtmlRule {
        class: HtmlClass::NotFound,
        phrases: &[
            "no existe",
            "no se encontr",
            "no encontrado",
            "not found",
            "no disponible",
        ],
        max_body_len: None,
    },
    HtmlRule {
        class: HtmlClass::ServerError,
        phrases: &[
            "error interno",
            "internal server error",
            "error en el servidor",
            "ha ocurrido un error",
            "http status 500",
        ],
        max_body_len: None,
    },
];

/// Classifies an HTML body against [`RULES`].
#[must_use]
pub fn classify_html(body: &str) -> HtmlClass {
    let lowered = body.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&lowered, body.len()))
        .map_or(HtmlClass::Unrecognized, |rule| rule.class)
}

/// Coarse kind of a 2xx response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Payload,
    Html,
    Other,
}

/// Decides from the content type, sniffing the body when it is missing.
#[must_use]
pub fn body_kind(content_type: Option<&str>, body: &[u8]) -> BodyKind {
    let Some(content_type) = content_type else {
        return sniff(body);
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime.is_empty() {
        sniff(body)
    } else if PAYLOAD_CONTENT_TYPES.contains(&mime.as_str()) {
        BodyKind::Payload
    } else if mime == "text/html" || mime == "application/xhtml+xml" {
        BodyKind::Html
    } else {
        BodyKind::Other
    }
}

fn sniff(body: &[u8]) -> BodyKind {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let head = &body[start..];
    if head.starts_with(b"%PDF") || head.starts_with(b"<?xml") {
        BodyKind::Payload
    } else if starts_with_ignore_case(head, b"<html") || starts_with_ignore_case(head, b"<!doctype") {
        BodyKind::Html
    } else {
        BodyKind::Other
    }
}

fn starts_with_ignore_case(haystack: &[u8], prefix: &[u8]) -> bool {
    haystack.len() >= prefix.len() && haystack[..prefix.len()].eq_ignore_ascii_case(prefix)
}
