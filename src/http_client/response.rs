//! Fetched page wrapper.

use std::collections::HashMap;

use reqwest::StatusCode;

/// A fully buffered HTTP response.
///
/// Bodies are kept as raw bytes; decoding happens at the encoding boundary
/// (`crate::encoding`) so that parsers never see undecoded legacy text.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that produced this response (after transport redirects, if any).
    pub url: String,
    pub status: StatusCode,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header (name is lower-cased).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response is an HTTP redirect.
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// Get the Location header.
    pub fn location(&self) -> Option<&str> {
        self.headers.get("location").map(|s| s.as_str())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Check whether the server claims not to support the request method.
    pub fn is_method_unsupported(&self) -> bool {
        matches!(
            self.status,
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_names_are_lowercased() {
        let page = FetchedPage::new("https://a.example/", StatusCode::FOUND, Vec::new())
            .with_header("Location", "https://b.example/");
        assert!(page.is_redirect());
        assert_eq!(page.location(), Some("https://b.example/"));
    }

    #[test]
    fn test_method_unsupported() {
        let page = FetchedPage::new("https://a.example/", StatusCode::METHOD_NOT_ALLOWED, "");
        assert!(page.is_method_unsupported());
        assert!(!page.is_success());
    }
}
