//! Error types for the stream collector.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by filter parsing, rule management, and streaming.
#[derive(Error, Debug)]
pub enum StreamFilterError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading an input file or writing log output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform API returned an error
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        retry_after: Option<u64>,
    },

    /// Rate limited
    #[error("rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// The rules endpoint rejected one or more rules
    #[error("rule sync failed: {0}")]
    Rules(String),

    /// GeoJSON input could not be interpreted
    #[error("malformed GeoJSON: {0}")]
    Geo(String),

    /// A keyword or user-ID file contained an unusable line
    #[error("invalid filter input: {0}")]
    Filter(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl StreamFilterError {
    /// Check if this error is worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            Self::Api { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }
}

/// Result type for stream-filter operations.
pub type StreamResult<T> = Result<T, StreamFilterError>;
