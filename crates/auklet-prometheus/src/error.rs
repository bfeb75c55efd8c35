//! Errors for metric queries.

use thiserror::Error;

/// Errors returned by a [`MetricSource`](crate::MetricSource).
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid prometheus url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("could not connect to prometheus: {0}")]
    Connect(String),

    #[error("prometheus request failed: {0}")]
    Request(String),

    #[error("prometheus returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode prometheus response: {0}")]
    Decode(String),

    #[error("prometheus query failed ({error_type}): {message}")]
    Api { error_type: String, message: String },

    #[error("query returned {0} series, expected exactly one")]
    SeriesCount(usize),

    #[error("query returned unsupported result type {0}")]
    UnexpectedType(String),

    #[error("could not parse sample value {0:?}")]
    Value(String),
}
