//! Error types for pulith-source.
//!
//! Errors are shared between every caller coalesced onto one fetch, so the
//! underlying errors are held behind `Arc`.

use std::sync::Arc;

use pulith_fetch::FetchState;
use pulith_verify::ContentHash;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(Arc<pulith_fetch::Error>),

    #[error("archive import failed: {0}")]
    Import(Arc<pulith_archive::Error>),

    #[error("store error: {0}")]
    Store(Arc<pulith_store::Error>),

    #[error("tree hash mismatch for {url}: expected {expected}, got {actual}")]
    HashMismatch {
        url: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl Error {
    /// Terminal state a fetch ends in with this error. Local storage
    /// failures are reported as [`FetchState::ImportError`].
    pub fn state(&self) -> FetchState {
        match self {
            Error::Fetch(e) => match e.as_ref() {
                pulith_fetch::Error::HttpStatus { .. } => FetchState::HttpStatusError,
                pulith_fetch::Error::Store(_)
                | pulith_fetch::Error::Index(_)
                | pulith_fetch::Error::Json(_) => FetchState::ImportError,
                _ => FetchState::NetworkError,
            },
            Error::Import(_) | Error::Store(_) => FetchState::ImportError,
            Error::HashMismatch { .. } => FetchState::HashMismatch,
            Error::Cancelled => FetchState::Cancelled,
        }
    }
}

impl From<pulith_fetch::Error> for Error {
    fn from(e: pulith_fetch::Error) -> Self {
        Error::Fetch(Arc::new(e))
    }
}

impl From<pulith_archive::Error> for Error {
    fn from(e: pulith_archive::Error) -> Self {
        Error::Import(Arc::new(e))
    }
}

impl From<pulith_store::Error> for Error {
    fn from(e: pulith_store::Error) -> Self {
        Error::Store(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
