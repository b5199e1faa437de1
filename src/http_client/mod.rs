//! Shared HTTP client with per-host pacing.
//!
//! Built once per process. Every request waits on the rate limiter for its
//! host and reports the response status back so overloaded hosts are given
//! more room.

mod response;

pub use response::HttpResponse;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::rate_limit::{InMemoryRateLimitBackend, RateLimiter};

/// Default User-Agent identifying the tracker to source servers.
pub const USER_AGENT: &str = concat!(
    "yjtracker/",
    env!("CARGO_PKG_VERSION"),
    " (Queensland Youth Justice Tracker data collection)"
);

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
}

pub struct HttpClientBuilder {
    user_agent: Option<String>,
    connect_timeout: Duration,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClientBuilder {
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Share a rate limiter. Without this, the client gets its own in-memory one.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let user_agent = self.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(self.connect_timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::new(Arc::new(InMemoryRateLimitBackend::new())));

        Ok(HttpClient {
            client,
            rate_limiter,
        })
    }
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder {
            user_agent: None,
            connect_timeout: Duration::from_secs(10),
            rate_limiter: None,
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// GET `url` after waiting for the host's slot. `timeout` covers the whole request.
    pub async fn get(
        &self,
        url: &str,
        timeout: Duration,
        min_interval: Duration,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, reqwest::Error> {
        let host = self.rate_limiter.acquire(url, min_interval).await;

        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = match request.send().await {
            Ok(r) => HttpResponse::from_reqwest(r),
            Err(e) => {
                if let Some(host) = &host {
                    if e.is_timeout() || e.is_connect() {
                        self.rate_limiter.report_server_error(host).await;
                    }
                }
                return Err(e);
            }
        };

        debug!("GET {} -> {}", url, response.status);
        if let Some(host) = &host {
            self.rate_limiter
                .report_status(host, response.status.as_u16())
                .await;
        }
        Ok(response)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}
