use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Failures that can happen to a single identifier (or a whole run, for `EmptyReport`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("could not fetch {url}: {reason}")]
    FetchFailure { url: String, reason: FetchReason },

    #[error("malformed document at {url}: {reason}")]
    MalformedDocument { url: String, reason: String },

    #[error("required field `{0}` not found")]
    FieldNotFound(String),

    #[error("no results to report")]
    EmptyReport,
}

impl Error {
    pub fn fetch(url: impl Into<String>, reason: FetchReason) -> Self {
        Error::FetchFailure {
            url: url.into(),
            reason,
        }
    }

    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedDocument {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Error::FieldNotFound(field.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchReason {
    Timeout(Duration),
    Status(u16),
    Network(String),
}

impl FetchReason {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchReason::Timeout(_) => true,
            FetchReason::Status(code) => *code == 429 || (500..=599).contains(code),
            FetchReason::Network(_) => false,
        }
    }
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchReason::Timeout(after) => write!(f, "timed out after {:.1}s", after.as_secs_f64()),
            FetchReason::Status(code) => write!(f, "HTTP {}", code),
            FetchReason::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}
