//! In-process pacing state. Not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{HostState, RateLimitBackend, RateLimitResult};

#[derive(Debug)]
struct HostEntry {
    state: HostState,
    /// When the most recently reserved slot starts.
    next_slot: Option<Instant>,
}

impl HostEntry {
    fn new(host: &str, base_delay_ms: u64) -> Self {
        Self {
            state: HostState::new(host, base_delay_ms),
            next_slot: None,
        }
    }

    fn time_until_ready(&self, now: Instant) -> Duration {
        match self.next_slot {
            Some(last) => {
                let ready_at = last + self.state.current_delay();
                ready_at.saturating_duration_since(now)
            }
            None => Duration::ZERO,
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    hosts: Arc<RwLock<HashMap<String, HostEntry>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every tracked host.
    pub async fn all_states(&self) -> HashMap<String, HostState> {
        let hosts = self.hosts.read().await;
        hosts
            .iter()
            .map(|(k, v)| (k.clone(), v.state.clone()))
            .collect()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn get_or_create(&self, host: &str, base_delay_ms: u64) -> RateLimitResult<HostState> {
        {
            let hosts = self.hosts.read().await;
            if let Some(entry) = hosts.get(host) {
                return Ok(entry.state.clone());
            }
        }

        let mut hosts = self.hosts.write().await;
        let entry = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostEntry::new(host, base_delay_ms));
        Ok(entry.state.clone())
    }

    async fn update(&self, state: &HostState) -> RateLimitResult<()> {
        let mut hosts = self.hosts.write().await;
        if let Some(entry) = hosts.get_mut(&state.host) {
            entry.state = state.clone();
        }
        Ok(())
    }

    async fn acquire(&self, host: &str, base_delay_ms: u64) -> RateLimitResult<Duration> {
        let mut hosts = self.hosts.write().await;
        let entry = hosts
            .entry(host.to_string())
            .or_insert_with(|| HostEntry::new(host, base_delay_ms));

        // Targets sharing a host get the strictest interval any of them asked for.
        if base_delay_ms > entry.state.base_delay_ms {
            entry.state.base_delay_ms = base_delay_ms;
            entry.state.current_delay_ms = entry.state.current_delay_ms.max(base_delay_ms);
        }

        let now = Instant::now();
        let wait = entry.time_until_ready(now);
        entry.next_slot = Some(now + wait);
        entry.state.total_requests += 1;
        Ok(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let backend = InMemoryRateLimitBackend::new();
        let wait = backend.acquire("www.qld.gov.au", 100).await.unwrap();
        assert_eq!(wait, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_second_acquire_waits() {
        let backend = InMemoryRateLimitBackend::new();
        backend.acquire("www.qld.gov.au", 100).await.unwrap();
        let wait = backend.acquire("www.qld.gov.au", 100).await.unwrap();

        assert!(wait > Duration::from_millis(90));
        assert!(wait <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_slots_queue_up() {
        let backend = InMemoryRateLimitBackend::new();
        backend.acquire("a.example", 100).await.unwrap();
        backend.acquire("a.example", 100).await.unwrap();
        let third = backend.acquire("a.example", 100).await.unwrap();
        assert!(third > Duration::from_millis(190));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let backend = InMemoryRateLimitBackend::new();
        backend.acquire("a.example", 1000).await.unwrap();
        let wait = backend.acquire("b.example", 1000).await.unwrap();
        assert_eq!(wait, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_strictest_interval_wins() {
        let backend = InMemoryRateLimitBackend::new();
        backend.acquire("a.example", 100).await.unwrap();
        let wait = backend.acquire("a.example", 500).await.unwrap();
        assert!(wait > Duration::from_millis(400));

        let state = backend.get_or_create("a.example", 100).await.unwrap();
        assert_eq!(state.base_delay_ms, 500);
        assert_eq!(state.total_requests, 2);
    }

    #[tokio::test]
    async fn test_update() {
        let backend = InMemoryRateLimitBackend::new();
        let mut state = backend.get_or_create("a.example", 100).await.unwrap();
        state.current_delay_ms = 800;
        state.in_backoff = true;
        backend.update(&state).await.unwrap();

        let all = backend.all_states().await;
        assert_eq!(all["a.example"].current_delay_ms, 800);
        assert!(all["a.example"].in_backoff);
    }
}
