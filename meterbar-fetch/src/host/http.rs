//! HTTP client with tracing, bounded retries and a domain allowlist.
//!
//! Strategies see HTTP through the narrow [`HttpApi`] trait: a request in,
//! a status and body out. Status interpretation is left to the strategy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::HttpError;
use crate::retry::RetryStrategy;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent string.
const USER_AGENT: &str = concat!("meterbar/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Request / Response
// ============================================================================

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    /// GET
    #[default]
    Get,
    /// POST
    Post,
}

/// A request issued by a strategy.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Method.
    pub method: HttpMethod,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body (POST).
    pub body: Option<String>,
}

impl HttpRequest {
    /// A GET request to `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// A POST request with a JSON body.
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body.into()),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }
}

/// A response handed back to a strategy.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body text.
    pub body: String,
    /// Parsed `Retry-After` header, in seconds.
    pub retry_after: Option<u64>,
}

impl HttpResponse {
    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

// ============================================================================
// HTTP API Trait
// ============================================================================

/// Narrow HTTP interface used by strategies.
#[async_trait]
pub trait HttpApi: Send + Sync {
    /// Sends a request and returns the status and body.
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ============================================================================
// HTTP Client
// ============================================================================

/// `HttpApi` backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    allowed_domains: Option<Vec<String>>,
    retry: RetryStrategy,
}

impl HttpClient {
    /// Creates a new HTTP client with default settings.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Setup` if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new HTTP client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Setup` if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpError::Setup(e.to_string()))?;

        Ok(Self {
            inner,
            allowed_domains: None,
            retry: RetryStrategy::default(),
        })
    }

    /// Restricts requests to the given domains and their subdomains.
    #[must_use]
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    /// Restricts requests to the hosts of `endpoints`.
    ///
    /// Endpoints that do not parse are skipped, so an empty or unparsable
    /// list allows nothing.
    #[must_use]
    pub fn with_allowed_endpoints(self, endpoints: &[&str]) -> Self {
        let mut hosts: Vec<String> = endpoints
            .iter()
            .filter_map(|e| Url::parse(e).ok())
            .filter_map(|u| u.host_str().map(str::to_string))
            .collect();
        hosts.sort_unstable();
        hosts.dedup();
        debug!(hosts = ?hosts, "HTTP allowlist");
        self.with_allowed_domains(hosts)
    }

    /// Sets the retry strategy.
    #[must_use]
    pub fn with_retry_strategy(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Checks if a URL's domain is allowed.
    fn is_domain_allowed(&self, url: &str) -> Result<(), HttpError> {
        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let Some(ref allowed) = self.allowed_domains else {
            return Ok(());
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?;

        let allowed = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));

        if allowed {
            Ok(())
        } else {
            Err(HttpError::DomainNotAllowed(host.to_string()))
        }
    }

    fn headers(request: &HttpRequest) -> Result<HeaderMap, HttpError> {
        let mut map = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HttpError::InvalidHeader(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| HttpError::InvalidHeader(e.to_string()))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl HttpApi for HttpClient {
    #[instrument(skip(self, request), fields(url = %request.url, method = ?request.method))]
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.is_domain_allowed(&request.url)?;
        let headers = Self::headers(&request)?;
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut builder = self
                .inner
                .request(method.clone(), &request.url)
                .headers(headers.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse().ok());
                    let body = response.text().await?;
                    debug!(status, attempt, body_len = body.len(), "Response received");
                    return Ok(HttpResponse {
                        status,
                        body,
                        retry_after,
                    });
                }
                Err(e) if attempt < self.retry.max_attempts && self.retry.should_retry(&e) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(attempt, error = %e, delay = ?delay, "Transient HTTP error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Placeholder used when a context is built without an HTTP client.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredHttp;

#[async_trait]
impl HttpApi for UnconfiguredHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        Err(HttpError::Setup(format!(
            "no HTTP client configured for {}",
            request.url
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_allowlist() {
        let client = HttpClient::new().unwrap().with_allowed_domains(vec![
            "api.anthropic.com".to_string(),
            "cursor.com".to_string(),
        ]);

        assert!(client.is_domain_allowed("https://api.anthropic.com/api/oauth/usage").is_ok());
        assert!(client.is_domain_allowed("https://www.cursor.com/api/usage").is_ok());
        assert!(client.is_domain_allowed("https://evil.com/steal").is_err());
        assert!(client.is_domain_allowed("not-a-valid-url").is_err());
    }

    #[test]
    fn test_allowlist_from_endpoints() {
        let client = HttpClient::new().unwrap().with_allowed_endpoints(&[
            "https://claude.ai/api/organizations",
            "https://claude.ai/api/organizations/{id}/usage",
            "https://api.z.ai/v1/usage",
            "not a url",
        ]);
        assert_eq!(
            client.allowed_domains.as_deref(),
            Some(&["api.z.ai".to_string(), "claude.ai".to_string()][..])
        );
        assert!(client.is_domain_allowed("https://claude.ai/api/organizations/org-1/usage").is_ok());
        assert!(matches!(
            client.is_domain_allowed("https://collector.example.com/"),
            Err(HttpError::DomainNotAllowed(host)) if host == "collector.example.com"
        ));
    }

    #[test]
    fn test_no_domain_restrictions() {
        let client = HttpClient::new().unwrap();
        assert!(client.is_domain_allowed("https://any.domain.com").is_ok());
    }

    #[test]
    fn test_request_builders() {
        let request = HttpRequest::get("https://api.github.com/copilot_internal/user")
            .bearer("tok")
            .header("Accept", "application/json");
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.headers[0], ("Authorization".to_string(), "Bearer tok".to_string()));
        assert!(HttpClient::headers(&request).is_ok());

        let bad = HttpRequest::get("https://x.test").header("Bad Header", "v");
        assert!(HttpClient::headers(&bad).is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_http_errors() {
        let result = UnconfiguredHttp.request(HttpRequest::get("https://x.test")).await;
        assert!(matches!(result, Err(HttpError::Setup(_))));
    }
}
