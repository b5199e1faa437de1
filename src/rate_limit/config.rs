//! Backoff tuning.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Multiplier applied on 429/503.
    pub backoff_multiplier: f64,
    /// Multiplier applied on other 5xx responses.
    pub server_error_multiplier: f64,
    /// Multiplier applied during recovery (< 1.0).
    pub recovery_multiplier: f64,
    /// Consecutive successes before the delay shrinks.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            server_error_multiplier: 1.5,
            recovery_multiplier: 0.8,
            recovery_threshold: 3,
        }
    }
}
