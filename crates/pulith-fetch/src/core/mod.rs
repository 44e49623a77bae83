//! Pure transformations for HTTP fetching: retry timing, status
//! classification, header parsing and cache key normalization. Nothing here
//! performs I/O.

mod headers;
mod key;
mod retry;
mod validation;

pub use headers::{
    header_value, header_values, immutable_link, parse_http_date, parse_immutable_link,
    parse_retry_after, redirect_headers,
};
pub use key::{CacheKey, KeyKind};
pub use retry::{RetryState, retry_delay};
pub use validation::{is_redirect, is_retryable_status, is_success};
