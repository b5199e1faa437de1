//! Fetchers turn a target into a raw document.

mod circuit;
mod http;
mod pdf;
mod render;

pub use circuit::CircuitBreakers;
pub use http::HttpFetcher;
pub use pdf::pdf_to_text;
pub use render::RenderService;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{RawDocument, Target};

/// Typed fetch failure.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("empty response body")]
    Empty,
    #[error("circuit open, next attempt in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },
    #[error("rendering service unavailable: {0}")]
    RenderingUnavailable(String),
    #[error("document conversion failed: {0}")]
    Conversion(String),
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Short machine-readable name, used in health records and alerts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::Empty => "empty",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RenderingUnavailable(_) => "rendering_unavailable",
            Self::Conversion(_) => "conversion",
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, target: &Target) -> Result<RawDocument, FetchError>;
}

pub type BoxedFetcher = Arc<dyn Fetcher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(FetchError::Network("reset".into()).is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(30)).is_retryable());
        for status in [408, 429, 500, 502, 503] {
            let err = FetchError::Status {
                status,
                url: "https://x".into(),
            };
            assert!(err.is_retryable(), "{} should retry", status);
        }
        for status in [400, 403, 404] {
            let err = FetchError::Status {
                status,
                url: "https://x".into(),
            };
            assert!(!err.is_retryable(), "{} should not retry", status);
        }
        assert!(!FetchError::Empty.is_retryable());
        assert!(!FetchError::Conversion("bad pdf".into()).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = FetchError::Status {
            status: 404,
            url: "https://www.qld.gov.au/missing".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404 from https://www.qld.gov.au/missing");
        assert_eq!(err.kind(), "status");
    }
}
