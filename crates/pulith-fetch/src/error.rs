//! Error types for pulith-fetch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("network error fetching {url} after {attempts} attempt(s): {message}")]
    Network {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("more than {max} redirects starting at {url}")]
    TooManyRedirects { url: String, max: u32 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("store error: {0}")]
    Store(#[from] pulith_store::Error),

    #[error("cache index error: {0}")]
    Index(#[from] pulith_fs::Error),

    #[error("cache entry encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
