//! Threshold alerts for failing targets.
//!
//! Every alert is logged at `error`. When a webhook is configured the alert
//! is also POSTed there as JSON. Delivery failures are logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::models::{HealthState, HealthStatus, Target};

/// Payload describing a target that has crossed the failure threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub target_id: String,
    pub url: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub host: Option<String>,
}

impl Alert {
    pub fn new(target: &Target, health: &HealthStatus, threshold: u32) -> Self {
        Self {
            target_id: target.id.clone(),
            url: target.url.clone(),
            state: health.state,
            consecutive_failures: health.consecutive_failures,
            threshold,
            last_error: health.last_error.clone(),
            last_error_at: health.last_error_at,
            host: health.host.clone(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} has failed {} consecutive runs (threshold {}): {}",
            self.target_id,
            self.consecutive_failures,
            self.threshold,
            self.last_error.as_deref().unwrap_or("unknown error")
        )
    }
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), AlertError>;
}

pub type BoxedAlertSink = Arc<dyn AlertSink>;

/// Logs alerts and nothing else.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        error!(target_id = %alert.target_id, "ALERT: {}", alert.summary());
        Ok(())
    }
}

/// Logs alerts and POSTs them to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: &str) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(crate::http_client::USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alert: &Alert) -> Result<(), AlertError> {
        LogAlertSink.send(alert).await?;

        let response = self.client.post(&self.url).json(alert).send().await?;
        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> Alert {
        let target = Target::new("pocket-stats", "https://example.gov.au/stats", "youth_statistics");
        let mut health = HealthStatus::new("pocket-stats");
        for _ in 0..3 {
            health.record_failure("HTTP 503 from https://example.gov.au/stats", Utc::now());
        }
        Alert::new(&target, &health, 3)
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            alert().summary(),
            "pocket-stats has failed 3 consecutive runs (threshold 3): HTTP 503 from https://example.gov.au/stats"
        );
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "target_id": "pocket-stats",
                "state": "error",
                "consecutive_failures": 3
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookAlertSink::new(&format!("{}/hook", server.uri())).unwrap();
        sink.send(&alert()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = WebhookAlertSink::new(&format!("{}/hook", server.uri())).unwrap();
        let err = sink.send(&alert()).await.unwrap_err();
        assert!(matches!(err, AlertError::Status(500)));
    }
}
