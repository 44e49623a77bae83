//! Conditional HTTP downloading into a content-addressed store.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable options, progress and cache entry types
//! - [`core`] - Pure transformations (retry timing, header parsing, cache keys)
//! - [`effects`] - I/O operations with trait abstraction
//!
//! # Key Features
//!
//! - **Conditional GET**: stale entries are revalidated with `If-None-Match`;
//!   a 304 reuses the stored content
//! - **Immutable URLs**: a `Link: <..>; rel="immutable"` response header pins
//!   an entry so it is never revalidated
//! - **Streaming Storage**: bodies are hashed while written to the store and
//!   committed only when complete
//! - **Bounded Retry**: transport failures and 429/502/503/504 are retried with
//!   exponential backoff, honoring `Retry-After`

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use self::core::{CacheKey, is_redirect, retry_delay};
pub use self::data::{CacheEntry, CachePayload, CachePolicy, FetchOptions, FetchState, Progress};
pub use self::effects::{
    BoxStream, CacheIndex, Coalescer, Download, DownloadOutcome, Downloader, HttpClient,
    MockClient, MockError, MockResponse, Request, Response,
};

#[cfg(feature = "reqwest")]
pub use self::effects::ReqwestClient;

pub use self::error::{Error, Result};
