//! Remote sources as verifiable content-addressed trees.
//!
//! [`SourceFetcher`] combines the conditional downloader from `pulith-fetch`
//! with the archive importer from `pulith-archive`:
//!
//! - [`SourceFetcher::download_file`] stores a single file and returns its
//!   [`ContentHash`].
//! - [`SourceFetcher::download_tarball`] imports an archive into a canonical
//!   tree and returns its hash together with a lazy [`TreeAccessor`].
//!
//! Both are cached across runs through the shared cache index; an archive is
//! imported again only when its bytes change.

mod error;
mod fetcher;
mod result;

pub use error::{Error, Result};
pub use fetcher::SourceFetcher;
pub use pulith_store::{TreeAccessor, Walk, WalkEntry};
pub use pulith_verify::ContentHash;
pub use result::{FileFetchResult, TarballFetchResult};
