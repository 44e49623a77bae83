use chrono::{DateTime, Utc};
use pulith_store::TreeAccessor;
use pulith_verify::ContentHash;

/// A single file fetched into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFetchResult {
    pub content: ContentHash,
    pub etag: Option<String>,
    /// URL after redirects.
    pub effective_url: String,
    pub immutable_url: Option<String>,
}

/// An archive imported as a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TarballFetchResult {
    pub tree_hash: ContentHash,
    /// Later of the origin `Last-Modified` and the newest entry mtime; the
    /// Unix epoch when neither is known.
    pub last_modified: DateTime<Utc>,
    pub immutable_url: Option<String>,
    /// Lazy read access to the imported tree.
    pub tree: TreeAccessor,
}
