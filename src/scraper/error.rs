//! Shared error type for fetching and parsing ModHub pages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    // HTTP and network
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },

    // Parsing
    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("No details section on mod page {url} (page layout may have changed)")]
    MissingDetails { url: String },

    #[error("Stop requested before {url} could be fetched")]
    Stopped { url: String },

    #[error("Could not save mod {mod_id}: {source}")]
    Store {
        mod_id: crate::model::ModId,
        source: crate::storage::StoreError,
    },
}

impl ScraperError {
    /// Whether another attempt at the same URL could succeed: timeouts, connection
    /// failures, HTTP 5xx and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            ScraperError::Network { source, .. } => {
                source.is_timeout() || source.is_connect()
            }
            ScraperError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            ScraperError::BodyRead { source, .. } => source.is_timeout() || source.is_body(),
            _ => false,
        }
    }
}
