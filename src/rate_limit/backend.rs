//! Pluggable storage for per-host request pacing.

use async_trait::async_trait;
use std::time::Duration;

pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Pacing state for one host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostState {
    pub host: String,
    /// Current gap enforced between requests.
    pub current_delay_ms: u64,
    /// The politeness interval configured for this host.
    pub base_delay_ms: u64,
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl HostState {
    pub fn new(host: &str, base_delay_ms: u64) -> Self {
        Self {
            host: host.to_string(),
            current_delay_ms: base_delay_ms,
            base_delay_ms,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    pub fn current_delay(&self) -> Duration {
        Duration::from_millis(self.current_delay_ms)
    }
}

/// Storage for host pacing state. Must tolerate concurrent callers.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Get or create state for a host.
    async fn get_or_create(&self, host: &str, base_delay_ms: u64) -> RateLimitResult<HostState>;

    /// Persist updated state.
    async fn update(&self, state: &HostState) -> RateLimitResult<()>;

    /// Reserve the next request slot for a host and return how long to wait for it.
    async fn acquire(&self, host: &str, base_delay_ms: u64) -> RateLimitResult<Duration>;
}
