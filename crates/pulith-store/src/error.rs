use std::io;

use pulith_verify::{ContentHash, VerificationError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("object {hash} is corrupted: {reason}")]
    Corrupted { hash: ContentHash, reason: String },

    #[error("{path} is not a {expected}")]
    WrongKind { path: String, expected: &'static str },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Fs(#[from] pulith_fs::Error),

    #[error(transparent)]
    Tree(#[from] VerificationError),
}

impl Error {
    pub(crate) fn missing(hash: &ContentHash) -> Self {
        Self::NotFound(format!("object {hash}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
