//! Adaptive sleep between empty polls.

use std::time::Duration;

/// Doubles on each empty poll, caps at `poll_limit`, resets to `base` the
/// moment a poll returns any work.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    /// One time-unit base, capped at `poll_limit_seconds`, matching the
    /// client façade's `subscribe(..., poll_limit_seconds)` parameter.
    pub fn with_poll_limit(poll_limit_seconds: u64) -> Self {
        Self::new(
            Duration::from_millis(1),
            Duration::from_secs(poll_limit_seconds.max(1)),
        )
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn record_empty_poll(&mut self) -> Duration {
        self.current = (self.current * 2).min(self.cap);
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub async fn sleep(&self) {
        tokio::time::sleep(self.current).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(backoff.current(), Duration::from_millis(10));
        assert_eq!(backoff.record_empty_poll(), Duration::from_millis(20));
        assert_eq!(backoff.record_empty_poll(), Duration::from_millis(40));
        assert_eq!(backoff.record_empty_poll(), Duration::from_millis(80));
        assert_eq!(backoff.record_empty_poll(), Duration::from_millis(100));
        assert_eq!(backoff.record_empty_poll(), Duration::from_millis(100));
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));
        backoff.record_empty_poll();
        backoff.record_empty_poll();
        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(10));
    }
}
