//! Hosted JavaScript rendering service.
//!
//! The service takes the page URL and a wait time as query parameters and
//! returns the rendered HTML. Authentication is a bearer token.

use std::time::Duration;

use url::Url;

#[derive(Debug, Clone)]
pub struct RenderService {
    endpoint: Url,
    api_key: Option<String>,
}

impl RenderService {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Self {
        Self { endpoint, api_key }
    }

    /// Service URL that renders `target_url`.
    pub fn request_url(&self, target_url: &str, wait: Duration) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("url", target_url)
            .append_pair("wait_ms", &wait.as_millis().to_string());
        url.to_string()
    }

    /// Authorization header value, if a key is configured.
    pub fn authorization(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_encodes_target() {
        let service = RenderService::new(
            Url::parse("https://render.example.com/v1/render").unwrap(),
            Some("secret".into()),
        );
        let url = service.request_url(
            "https://www.qld.gov.au/stats?year=2024&x=1",
            Duration::from_millis(2500),
        );
        assert_eq!(
            url,
            "https://render.example.com/v1/render?url=https%3A%2F%2Fwww.qld.gov.au%2Fstats%3Fyear%3D2024%26x%3D1&wait_ms=2500"
        );
        assert_eq!(service.authorization().as_deref(), Some("Bearer secret"));
    }

    #[test]
    fn test_no_key_no_header() {
        let service = RenderService::new(Url::parse("https://render.example.com/").unwrap(), None);
        assert_eq!(service.authorization(), None);
    }
}
