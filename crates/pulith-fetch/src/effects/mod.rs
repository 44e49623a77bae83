//! I/O behind trait seams: the HTTP transport, the persistent cache index,
//! the conditional downloader and per-key coalescing.

mod blocking;
mod cache;
mod coalesce;
mod downloader;
mod http;
mod mock;

pub use cache::CacheIndex;
pub use coalesce::Coalescer;
pub use downloader::{Download, DownloadOutcome, Downloader};
pub use http::{BoxStream, HttpClient, Request, Response};
pub use mock::{MockClient, MockError, MockResponse};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
