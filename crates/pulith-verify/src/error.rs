use std::io;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("invalid SHA-256 hash: {0}")]
    InvalidHash(String),

    #[error("malformed directory object: {0}")]
    MalformedTree(&'static str),

    #[error("invalid tree path: {0}")]
    InvalidTreePath(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, VerificationError>;
