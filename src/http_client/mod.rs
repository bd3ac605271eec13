//! HTTP client with per-host rate limiting and explicit redirect control.

mod response;
mod user_agent;

pub use response::FetchedPage;
pub use user_agent::{resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{redirect, Client};
use tracing::debug;

use crate::rate_limit::RateLimiter;

/// HTTP method used for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Head,
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: RequestMethod,
    pub timeout: Duration,
    /// Let the transport follow 3xx responses. Probes turn this off so
    /// every hop is visible to the caller.
    pub follow_redirects: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: RequestMethod::Get,
            timeout,
            follow_redirects: true,
        }
    }

    pub fn head(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: RequestMethod::Head,
            ..Self::get(url, timeout)
        }
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("No response available for {0}")]
    Unavailable(String),
}

/// Anything that can turn a request into a buffered page.
///
/// The scraper depends on this trait rather than on reqwest directly so
/// tests can script upstream responses.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError>;
}

/// Fetch and require a 2xx status.
pub async fn fetch_success(
    fetcher: &dyn PageFetcher,
    request: &FetchRequest,
) -> Result<FetchedPage, FetchError> {
    let page = fetcher.fetch(request).await?;
    if !page.is_success() {
        return Err(FetchError::Status {
            url: request.url.clone(),
            status: page.status.as_u16(),
        });
    }
    Ok(page)
}

/// reqwest-backed fetcher with adaptive per-host rate limiting.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    no_redirect_client: Client,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Create a new HTTP client.
    /// - None: Use default collector user agent
    /// - Some("impersonate"): Use random real browser user agent
    /// - Some(custom): Use custom user agent string
    pub fn new(
        user_agent_config: Option<&str>,
        rate_limiter: RateLimiter,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent_config);
        let build = |policy: redirect::Policy| {
            Client::builder()
                .user_agent(&user_agent)
                .redirect(policy)
                .cookie_store(true)
                .gzip(true)
                .brotli(true)
                .build()
        };

        Ok(Self {
            client: build(redirect::Policy::limited(5))?,
            no_redirect_client: build(redirect::Policy::none())?,
            rate_limiter,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let host = self.rate_limiter.acquire(&request.url).await;

        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };
        let builder = match request.method {
            RequestMethod::Get => client.get(&request.url),
            RequestMethod::Head => client.head(&request.url),
        };

        let start = Instant::now();
        let response = builder
            .timeout(request.timeout)
            .header("Accept-Language", "ja,en;q=0.7")
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: request.url.clone(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
            }
        }

        let body = match request.method {
            RequestMethod::Head => Vec::new(),
            RequestMethod::Get => response
                .bytes()
                .await
                .map_err(|source| FetchError::Request {
                    url: request.url.clone(),
                    source,
                })?
                .to_vec(),
        };

        debug!(
            "{:?} {} -> {} ({} bytes, {:?})",
            request.method,
            request.url,
            status.as_u16(),
            body.len(),
            start.elapsed()
        );

        if let Some(ref host) = host {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            self.rate_limiter
                .record(host, status.as_u16(), retry_after)
                .await;
        }

        Ok(FetchedPage {
            url: final_url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_request_keeps_url_and_timeout() {
        let req = FetchRequest::head("https://viper.2ch.sc/news4vip/", Duration::from_secs(5))
            .without_redirects();
        assert_eq!(req.method, RequestMethod::Head);
        assert_eq!(req.timeout, Duration::from_secs(5));
        assert!(!req.follow_redirects);
    }

    #[test]
    fn test_client_builds_with_default_agent() {
        assert!(HttpClient::new(None, RateLimiter::new()).is_ok());
    }
}
