//! Adaptive per-host rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

pub use super::config::RateLimitConfig;

use super::backend::{HostState, RateLimitBackend};

pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;

/// Enforces each target's politeness interval per host, backing off when a
/// host signals overload (429, 503) and easing back after sustained success.
#[derive(Clone)]
pub struct RateLimiter {
    backend: BoxedRateLimitBackend,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(backend: BoxedRateLimitBackend) -> Self {
        Self::with_config(backend, RateLimitConfig::default())
    }

    pub fn with_config(backend: BoxedRateLimitBackend, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    pub fn extract_host(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait for the host's next slot. Returns the host name.
    pub async fn acquire(&self, url: &str, min_interval: Duration) -> Option<String> {
        let host = Self::extract_host(url)?;
        let base_ms = min_interval.as_millis() as u64;

        match self.backend.acquire(&host, base_ms).await {
            Ok(wait) => {
                if wait > Duration::ZERO {
                    debug!("Rate limiting {}: waiting {:?}", host, wait);
                    tokio::time::sleep(wait).await;
                }
            }
            Err(e) => warn!("Rate limit acquire failed for {}: {}", host, e),
        }
        Some(host)
    }

    async fn load(&self, host: &str) -> Option<HostState> {
        match self.backend.get_or_create(host, 0).await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Failed to load rate limit state for {}: {}", host, e);
                None
            }
        }
    }

    async fn store(&self, state: &HostState) {
        if let Err(e) = self.backend.update(state).await {
            warn!("Failed to update rate limit state for {}: {}", state.host, e);
        }
    }

    pub async fn report_success(&self, host: &str) {
        let Some(mut state) = self.load(host).await else {
            return;
        };
        state.consecutive_successes += 1;

        if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
            let reduced = (state.current_delay_ms as f64 * self.config.recovery_multiplier) as u64;
            if reduced <= state.base_delay_ms {
                state.current_delay_ms = state.base_delay_ms;
                state.in_backoff = false;
                info!("{} recovered from backoff", host);
            } else {
                state.current_delay_ms = reduced;
                debug!("{} delay reduced to {}ms", host, reduced);
            }
            state.consecutive_successes = 0;
        }

        self.store(&state).await;
    }

    /// A definite overload signal: double the delay.
    pub async fn report_rate_limit(&self, host: &str, status: u16) {
        let Some(mut state) = self.load(host).await else {
            return;
        };
        state.rate_limit_hits += 1;
        state.consecutive_successes = 0;
        state.in_backoff = true;
        state.current_delay_ms = self.scaled(&state, self.config.backoff_multiplier);

        warn!(
            "Rate limited by {} (HTTP {}), backing off to {}ms",
            host, status, state.current_delay_ms
        );
        self.store(&state).await;
    }

    /// Other server errors: mild backoff.
    pub async fn report_server_error(&self, host: &str) {
        let Some(mut state) = self.load(host).await else {
            return;
        };
        state.consecutive_successes = 0;
        state.in_backoff = true;
        state.current_delay_ms = self.scaled(&state, self.config.server_error_multiplier);
        debug!("Server error from {}, delay now {}ms", host, state.current_delay_ms);
        self.store(&state).await;
    }

    fn scaled(&self, state: &HostState, multiplier: f64) -> u64 {
        let floor = state.current_delay_ms.max(1);
        let next = (floor as f64 * multiplier) as u64;
        next.min(self.config.max_delay.as_millis() as u64)
    }

    pub fn is_rate_limit_status(status: u16) -> bool {
        matches!(status, 429 | 503)
    }

    /// Route a response status to the matching report.
    pub async fn report_status(&self, host: &str, status: u16) {
        if Self::is_rate_limit_status(status) {
            self.report_rate_limit(host, status).await;
        } else if status >= 500 {
            self.report_server_error(host).await;
        } else if (200..400).contains(&status) {
            self.report_success(host).await;
        }
    }

    pub fn backend(&self) -> &BoxedRateLimitBackend {
        &self.backend
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
