use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Maximum number of body bytes kept in error values and log lines.
pub const SNIPPET_LEN: usize = 200;

/// Errors raised while talking to an upstream.
///
/// Adapters never surface these to the walk; they log them and translate
/// them into "directory unavailable" (or a halt, for rate limits).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure: DNS, connect, TLS, timeout.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: HttpError,
    },

    /// Upstream answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: u16,
        snippet: String,
    },

    /// Upstream reported that the request quota is exhausted.
    #[error("rate limited by {url}")]
    RateLimited {
        url: String,
        reset_at: Option<DateTime<Utc>>,
    },

    /// Body could not be decoded into the expected shape.
    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SourceError {
    #[inline]
    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.into(),
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Transport failures and 5xx/429 answers may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// First [`SNIPPET_LEN`] bytes of a body, cut on a char boundary.
pub fn snippet(body: &str) -> String {
    if body.len() <= SNIPPET_LEN {
        return body.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
