use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported archive format{}", hint_suffix(.0))]
    UnsupportedFormat(Option<String>),

    #[error("unsafe entry path '{0}'")]
    UnsafePath(String),

    #[error("invalid entry path '{0}'")]
    InvalidPath(String),

    #[error("unsupported entry '{path}' of kind {kind}")]
    UnsupportedEntry { path: String, kind: String },

    #[error("hard link '{path}' points to '{target}', which is not an earlier file")]
    MissingLinkTarget { path: String, target: String },

    #[error("archive is corrupted: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref()
        .map(|h| format!(" (hint: {h})"))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn corrupted(e: impl std::fmt::Display) -> Self {
        Self::Corrupted(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
