use std::fmt;

/// Lifecycle of one fetch.
///
/// `Pending → Requesting → {CacheHit | Downloading} → [Importing] → Cached →
/// Done`, or one of the failure states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FetchState {
    #[default]
    Pending,
    Requesting,
    CacheHit,
    Downloading,
    Importing,
    Cached,
    Done,
    NetworkError,
    HttpStatusError,
    ImportError,
    HashMismatch,
    Cancelled,
}

impl FetchState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == FetchState::Done || self.is_failure()
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            FetchState::NetworkError
                | FetchState::HttpStatusError
                | FetchState::ImportError
                | FetchState::HashMismatch
                | FetchState::Cancelled
        )
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchState::Pending => "pending",
            FetchState::Requesting => "requesting",
            FetchState::CacheHit => "cache-hit",
            FetchState::Downloading => "downloading",
            FetchState::Importing => "importing",
            FetchState::Cached => "cached",
            FetchState::Done => "done",
            FetchState::NetworkError => "network-error",
            FetchState::HttpStatusError => "http-status-error",
            FetchState::ImportError => "import-error",
            FetchState::HashMismatch => "hash-mismatch",
            FetchState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot passed to progress callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub url: String,

    pub state: FetchState,

    /// Body bytes written to the store so far in the current attempt.
    pub bytes_downloaded: u64,

    /// Total expected bytes, if known from the Content-Length header.
    pub total_bytes: Option<u64>,
}

impl Progress {
    pub fn new(url: impl Into<String>, state: FetchState) -> Self {
        Self {
            url: url.into(),
            state,
            bytes_downloaded: 0,
            total_bytes: None,
        }
    }

    /// Percentage of completion, `None` if the total is unknown.
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                if self.state.is_terminal() { 100.0 } else { 0.0 }
            } else {
                (self.bytes_downloaded as f64 / total as f64) * 100.0
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(FetchState::Done.is_terminal());
        assert!(FetchState::Cancelled.is_terminal());
        assert!(!FetchState::Cached.is_terminal());
        assert!(!FetchState::Done.is_failure());
        assert!(FetchState::HashMismatch.is_failure());
    }

    #[test]
    fn percentage() {
        let mut progress = Progress::new("https://x.org/a", FetchState::Downloading);
        assert_eq!(progress.percentage(), None);
        progress.total_bytes = Some(200);
        progress.bytes_downloaded = 50;
        assert_eq!(progress.percentage(), Some(25.0));
        progress.total_bytes = Some(0);
        assert_eq!(progress.percentage(), Some(0.0));
        progress.state = FetchState::Done;
        assert_eq!(progress.percentage(), Some(100.0));
    }

    #[test]
    fn display() {
        assert_eq!(FetchState::CacheHit.to_string(), "cache-hit");
    }
}
