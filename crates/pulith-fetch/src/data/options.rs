use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::progress::Progress;

/// Progress callback shared between clones of [`FetchOptions`].
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Configuration for HTTP fetching operations.
///
/// # Examples
///
/// ```
/// use pulith_fetch::data::FetchOptions;
/// use std::time::Duration;
///
/// let options = FetchOptions::default()
///     .max_retries(5)
///     .retry_backoff(Duration::from_millis(200))
///     .max_redirects(4);
/// ```
#[derive(Clone)]
pub struct FetchOptions {
    /// Maximum number of retry attempts for transient failures.
    ///
    /// - Retries are triggered by transport errors, timeouts and
    ///   429/502/503/504 responses
    /// - Other 4xx/5xx statuses fail immediately
    /// - Total attempts = 1 (initial) + max_retries
    ///
    /// Default: 3
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    ///
    /// The delay before retry N (counting from 0) is `retry_backoff * 2^N`.
    ///
    /// Default: 100ms
    pub retry_backoff: Duration,

    /// Upper bound for a server supplied `Retry-After`.
    ///
    /// Default: 60s
    pub max_retry_after: Duration,

    /// Timeout for receiving response headers, and for each body chunk.
    ///
    /// Default: 30s
    pub request_timeout: Duration,

    /// Maximum redirect hops followed per attempt.
    ///
    /// Default: 10
    pub max_redirects: u32,

    /// Progress callback invoked on state transitions and chunk writes.
    ///
    /// Default: None
    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("max_retry_after", &self.max_retry_after)
            .field("request_timeout", &self.request_timeout)
            .field("max_redirects", &self.max_redirects)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .finish()
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            max_retry_after: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            max_redirects: 10,
            on_progress: None,
        }
    }
}

impl FetchOptions {
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    #[must_use]
    pub fn max_retry_after(mut self, max_retry_after: Duration) -> Self {
        self.max_retry_after = max_retry_after;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Set the progress callback.
    ///
    /// # Examples
    ///
    /// ```
    /// use pulith_fetch::data::{FetchOptions, FetchState, Progress};
    /// use std::sync::Arc;
    ///
    /// let options = FetchOptions::default().on_progress(Arc::new(|p: &Progress| {
    ///     if p.state == FetchState::Downloading {
    ///         println!("{} bytes", p.bytes_downloaded);
    ///     }
    /// }));
    /// ```
    #[must_use]
    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Invoke the progress callback, if any.
    pub fn report(&self, progress: &Progress) {
        if let Some(callback) = &self.on_progress {
            callback(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = FetchOptions::default();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.retry_backoff, Duration::from_millis(100));
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.max_redirects, 10);
        assert!(options.on_progress.is_none());
    }

    #[test]
    fn builder_chain() {
        let options = FetchOptions::default()
            .max_retries(0)
            .request_timeout(Duration::from_millis(5))
            .on_progress(Arc::new(|_: &Progress| {}));
        assert_eq!(options.max_retries, 0);
        assert_eq!(options.request_timeout, Duration::from_millis(5));
        assert!(format!("{options:?}").contains("{ ... }"));
    }
}
