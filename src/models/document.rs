//! Fetched document content, held only for the duration of extraction.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::target::ContentKind;
use crate::extract::html;

/// Metadata about a fetched document.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub content_length: usize,
    /// Hex SHA-256 of the body as received.
    pub content_hash: String,
    pub content_type: Option<String>,
}

/// Raw content for one target at one point in time.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub target_id: String,
    pub url: String,
    pub retrieved_at: DateTime<Utc>,
    pub content: ContentKind,
    /// Plain text used by pattern rules.
    pub text: String,
    /// Original markup, kept for selector and table rules.
    pub markup: Option<String>,
    /// Parsed body for JSON targets.
    pub json: Option<serde_json::Value>,
    pub metadata: DocumentMetadata,
}

impl RawDocument {
    /// Build a document from a decoded body.
    ///
    /// Never fails: a JSON body that doesn't parse keeps its text and logs a
    /// warning, so extraction degrades to whatever the text rules can find.
    pub fn from_body(target_id: &str, url: &str, content: ContentKind, body: &str) -> Self {
        let metadata = DocumentMetadata {
            title: None,
            content_length: body.len(),
            content_hash: hex::encode(Sha256::digest(body.as_bytes())),
            content_type: None,
        };

        let mut doc = Self {
            target_id: target_id.to_string(),
            url: url.to_string(),
            retrieved_at: Utc::now(),
            content,
            text: String::new(),
            markup: None,
            json: None,
            metadata,
        };

        match content {
            ContentKind::Html => {
                doc.metadata.title = html::title(body);
                doc.text = html::visible_text(body);
                doc.markup = Some(body.to_string());
            }
            ContentKind::Json => {
                match serde_json::from_str::<serde_json::Value>(body) {
                    Ok(value) => doc.json = Some(value),
                    Err(e) => warn!("{}: response is not valid JSON: {}", target_id, e),
                }
                doc.text = body.to_string();
            }
            ContentKind::Pdf | ContentKind::Text => {
                doc.text = html::collapse_whitespace(body);
            }
        }

        doc
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.metadata.content_type = content_type;
        self
    }

    /// Document name used as record provenance.
    pub fn document_name(&self) -> String {
        self.metadata
            .title
            .clone()
            .unwrap_or_else(|| {
                self.url
                    .rsplit('/')
                    .next()
                    .unwrap_or(self.url.as_str())
                    .to_string()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_document() {
        let html = "<html><head><title>Youth Justice Pocket Stats</title></head>\
                    <body><p>Rate: 175 per 10,000</p><script>var x = 1;</script></body></html>";
        let doc = RawDocument::from_body("t", "https://example.gov.au/a", ContentKind::Html, html);

        assert_eq!(
            doc.metadata.title.as_deref(),
            Some("Youth Justice Pocket Stats")
        );
        assert!(doc.text.contains("Rate: 175 per 10,000"));
        assert!(!doc.text.contains("var x"));
        assert!(doc.markup.is_some());
        assert_eq!(doc.metadata.content_hash.len(), 64);
        assert_eq!(doc.document_name(), "Youth Justice Pocket Stats");
    }

    #[test]
    fn test_invalid_json_keeps_text() {
        let doc = RawDocument::from_body("t", "https://x/api", ContentKind::Json, "{not json");
        assert!(doc.json.is_none());
        assert_eq!(doc.text, "{not json");
    }

    #[test]
    fn test_document_name_falls_back_to_url() {
        let doc = RawDocument::from_body(
            "t",
            "https://budget.qld.gov.au/files/sds-youth-justice.pdf",
            ContentKind::Pdf,
            "text",
        );
        assert_eq!(doc.document_name(), "sds-youth-justice.pdf");
    }
}
