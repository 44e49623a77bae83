use std::time::Duration;

/// Calculate the delay before a retry attempt using exponential backoff.
///
/// The delay formula is: `base * 2^retry_count`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use pulith_fetch::core::retry_delay;
///
/// // First retry: base * 2^0 = base
/// assert_eq!(retry_delay(0, Duration::from_millis(100)), Duration::from_millis(100));
///
/// // Third retry: base * 2^2 = base * 4
/// assert_eq!(retry_delay(2, Duration::from_millis(100)), Duration::from_millis(400));
/// ```
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// Bookkeeping for a bounded retry loop.
///
/// Total attempts are `1 + max_retries`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryState {
    retries: u32,
    max_retries: u32,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            retries: 0,
            max_retries,
        }
    }

    /// Attempts made so far, counting the one in progress.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Consume one retry and return the delay to wait before it, or `None`
    /// when retries are exhausted. A server supplied `retry_after` replaces
    /// the exponential backoff.
    pub fn next_delay(&mut self, base: Duration, retry_after: Option<Duration>) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        let delay = retry_after.unwrap_or_else(|| retry_delay(self.retries, base));
        self.retries += 1;
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_basic() {
        let base = Duration::from_millis(100);

        assert_eq!(retry_delay(0, base), Duration::from_millis(100));
        assert_eq!(retry_delay(1, base), Duration::from_millis(200));
        assert_eq!(retry_delay(2, base), Duration::from_millis(400));
        assert_eq!(retry_delay(3, base), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_delay_zero_base() {
        let base = Duration::ZERO;
        assert_eq!(retry_delay(0, base), Duration::ZERO);
        assert_eq!(retry_delay(10, base), Duration::ZERO);
    }

    #[test]
    fn test_retry_delay_overflow_protection() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert_eq!(retry_delay(40, base), Duration::MAX);
    }

    #[test]
    fn test_retry_state_is_bounded() {
        let base = Duration::from_millis(10);
        let mut state = RetryState::new(2);

        assert_eq!(state.attempts(), 1);
        assert_eq!(state.next_delay(base, None), Some(Duration::from_millis(10)));
        assert_eq!(state.next_delay(base, None), Some(Duration::from_millis(20)));
        assert_eq!(state.next_delay(base, None), None);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        let mut state = RetryState::new(1);
        let delay = state.next_delay(Duration::from_millis(10), Some(Duration::from_secs(2)));
        assert_eq!(delay, Some(Duration::from_secs(2)));
        assert_eq!(state.retries(), 1);
    }

    #[test]
    fn test_no_retries() {
        let mut state = RetryState::new(0);
        assert_eq!(state.next_delay(Duration::from_millis(1), None), None);
        assert_eq!(state.attempts(), 1);
    }
}
