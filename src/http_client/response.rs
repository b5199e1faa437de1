//! HTTP response wrapper.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::rate_limit::parse_retry_after;

pub struct HttpResponse {
    pub status: StatusCode,
    /// Header names are lowercase.
    pub headers: HashMap<String, String>,
    response: Response,
}

impl HttpResponse {
    pub(crate) fn from_reqwest(response: Response) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        Self {
            status: response.status(),
            headers,
            response,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status.as_u16(), 429 | 503)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(self.headers.get("retry-after").map(|s| s.as_str()))
    }

    pub async fn bytes(self) -> Result<Vec<u8>, reqwest::Error> {
        self.response.bytes().await.map(|b| b.to_vec())
    }

    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
