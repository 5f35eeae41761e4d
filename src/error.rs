//! Error taxonomy for the collector and charting paths.
//!
//! Configuration problems are fatal and never retried. Upstream and store
//! failures propagate to the caller of the top-level entry points. Empty
//! results (no devices, no readings, no rows in range) are not errors and
//! never show up here.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from {service}: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Batch write failed after {written} rows were saved ({failed} rows not saved): {source}")]
    BatchWrite {
        written: usize,
        failed: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Authorization failed: {0}")]
    Oauth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a retry has a chance of succeeding.
    ///
    /// Only transport failures, throttling and server-side errors qualify.
    /// Client errors (bad credentials, unknown device) are final.
    pub fn is_transient(&self) -> bool {
        // ---
        match self {
            Self::Upstream { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Store(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
