// Error types for EthioScan
// Item-level failures (FetchError) never abort a scan; ScanError is what the pipeline returns

use std::time::Duration;
use thiserror::Error;

/// Failure of a single HTTP exchange.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme '{0}' (only http and https are fetched)")]
    UnsupportedScheme(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Transient failures are worth another attempt; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Connect(_))
    }

    /// Classify a reqwest error into the taxonomy above.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else if err.is_body() || err.is_decode() {
            FetchError::Body(err.to_string())
        } else {
            FetchError::Http(err)
        }
    }
}

/// Run-level errors. Only these abort a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("target domain '{domain}' is not authorized for scanning")]
    Unauthorized { domain: String },

    #[error("payload catalog error: {0}")]
    Catalog(String),

    #[error("fetcher setup failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
