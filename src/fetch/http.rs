//! HTTP fetcher with bounded retry and a circuit breaker per target.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{pdf_to_text, CircuitBreakers, FetchError, Fetcher, RenderService};
use crate::http_client::HttpClient;
use crate::models::{ContentKind, RawDocument, Target};
use crate::rate_limit::backoff_delay;

/// A failed attempt, with any server-requested delay before the next one.
struct AttemptError {
    error: FetchError,
    retry_after: Option<Duration>,
}

impl From<FetchError> for AttemptError {
    fn from(error: FetchError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: HttpClient,
    render: Option<RenderService>,
    circuits: Arc<CircuitBreakers>,
}

impl HttpFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            render: None,
            circuits: Arc::new(CircuitBreakers::new()),
        }
    }

    pub fn with_render(mut self, render: RenderService) -> Self {
        self.render = Some(render);
        self
    }

    pub fn circuits(&self) -> &CircuitBreakers {
        &self.circuits
    }

    fn map_request_error(e: reqwest::Error, timeout: Duration) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(timeout)
        } else {
            FetchError::Network(e.to_string())
        }
    }

    async fn attempt(&self, target: &Target) -> Result<RawDocument, AttemptError> {
        let mut timeout = target.timeout;
        let mut auth = None;
        let request_url = match target.render {
            Some(options) => {
                let render = self.render.as_ref().ok_or_else(|| {
                    FetchError::RenderingUnavailable(
                        "target requires rendering but RENDER_API_URL is not set".into(),
                    )
                })?;
                timeout += options.wait;
                auth = render.authorization();
                render.request_url(&target.url, options.wait)
            }
            None => target.url.clone(),
        };

        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("authorization", value)])
            .unwrap_or_default();

        let response = self
            .client
            .get(&request_url, timeout, target.rate_limit.min_interval, &headers)
            .await
            .map_err(|e| Self::map_request_error(e, timeout))?;

        if !response.is_success() {
            let retry_after = response.retry_after();
            return Err(AttemptError {
                error: FetchError::Status {
                    status: response.status.as_u16(),
                    url: target.url.clone(),
                },
                retry_after,
            });
        }

        let content_type = response.content_type().map(|s| s.to_string());

        let body = match target.content {
            ContentKind::Pdf => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Self::map_request_error(e, timeout))?;
                if bytes.is_empty() {
                    return Err(FetchError::Empty.into());
                }
                pdf_to_text(bytes).await?
            }
            _ => response
                .text()
                .await
                .map_err(|e| Self::map_request_error(e, timeout))?,
        };

        if body.trim().is_empty() {
            return Err(FetchError::Empty.into());
        }

        debug!("{}: fetched {} bytes", target.id, body.len());
        Ok(RawDocument::from_body(&target.id, &target.url, target.content, &body)
            .with_content_type(content_type))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &Target) -> Result<RawDocument, FetchError> {
        if let Err(retry_in) = self
            .circuits
            .check(&target.id, &target.circuit, Instant::now())
        {
            return Err(FetchError::CircuitOpen { retry_in });
        }

        let max_attempts = target.retry.max_attempts.max(1);
        let mut attempt = 0;
        let error = loop {
            match self.attempt(target).await {
                Ok(doc) => {
                    self.circuits.record_success(&target.id);
                    if attempt > 0 {
                        info!("{}: succeeded after {} retries", target.id, attempt);
                    }
                    return Ok(doc);
                }
                Err(failed) => {
                    attempt += 1;
                    if !failed.error.is_retryable() || attempt >= max_attempts {
                        break failed.error;
                    }
                    let delay = failed
                        .retry_after
                        .unwrap_or_else(|| backoff_delay(attempt - 1, target.retry.base_delay));
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        target.id, attempt, max_attempts, failed.error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        self.circuits
            .record_failure(&target.id, &target.circuit, Instant::now());
        Err(error)
    }
}
