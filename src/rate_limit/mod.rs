//! Per-host request pacing shared by every fetch.
//!
//! Each target declares a minimum interval between requests; targets that
//! share a host are paced together. Overload responses widen the interval
//! until the host recovers.

mod backend;
mod config;
mod limiter;
mod memory;

pub use backend::{HostState, RateLimitBackend, RateLimitError, RateLimitResult};
pub use config::RateLimitConfig;
pub use limiter::{BoxedRateLimitBackend, RateLimiter};
pub use memory::InMemoryRateLimitBackend;

use std::time::Duration;

/// Parse a `Retry-After` header given in seconds, capped at one minute.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    header_value?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Exponential backoff for a zero-based retry attempt, capped at one minute.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(60_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(0, base), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, base), Duration::from_millis(2000));
        assert_eq!(backoff_delay(3, base), Duration::from_millis(8000));
        assert_eq!(backoff_delay(40, base), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some("3600")), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
