//! Process-wide client configuration
//!
//! The only shared state across exchanges is the default timeout. It is
//! read once per send and written at most once, by the embedding
//! application at startup, so plain relaxed atomics are enough.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Timeout applied to an exchange when the request does not set its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);

static DEFAULT_TIMEOUT_MS: AtomicU64 = AtomicU64::new(20_000);

/// Current process-wide default exchange timeout.
pub fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TIMEOUT_MS.load(Ordering::Relaxed))
}

/// Override the process-wide default exchange timeout.
///
/// Affects every subsequent [`Request::send`](crate::Request::send) that
/// does not carry its own timeout. Sub-millisecond precision is dropped.
pub fn set_default_timeout(timeout: Duration) {
    DEFAULT_TIMEOUT_MS.store(timeout.as_millis() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_twenty_seconds() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(20));
    }
}
