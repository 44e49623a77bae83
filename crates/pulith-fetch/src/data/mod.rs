//! Immutable data types for fetching: options, progress reporting and the
//! persisted cache entry format.

pub mod entry;
pub mod options;
pub mod progress;

pub use entry::{CacheEntry, CachePayload, CachePolicy};
pub use options::{FetchOptions, ProgressCallback};
pub use progress::{FetchState, Progress};
