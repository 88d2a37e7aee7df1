//! HTTP-backed strategy: OAuth, API-token and cookie authenticated requests.

use std::path::PathBuf;

use async_trait::async_trait;
use meterbar_core::{CredentialSource, ProviderKind, ProviderMetadata};
use meterbar_fetch::{
    FetchContext, FetchError, FetchKind, FetchResult, FetchStrategy, HttpMethod, HttpRequest,
    KeychainError,
};
use tracing::{debug, instrument, warn};

use super::{UsageParser, finish};

// ============================================================================
// Spec
// ============================================================================

/// Where a bearer token may be found, tried in declared order.
#[derive(Debug, Clone, Copy)]
pub enum TokenSource {
    /// An environment variable.
    Env(&'static str),
    /// A keychain item, optionally holding JSON with the token at `pointer`.
    Keychain {
        /// Keychain service name.
        service: &'static str,
        /// Keychain account name.
        account: &'static str,
        /// JSON pointer to the token when the secret is a JSON document.
        pointer: Option<&'static str>,
    },
    /// A JSON file written by the provider's own tooling.
    JsonFile {
        /// Resolves the file location.
        path: fn() -> Option<PathBuf>,
        /// JSON pointer to the token.
        pointer: &'static str,
    },
}

/// How the request is authenticated.
#[derive(Debug, Clone, Copy)]
pub enum HttpAuth {
    /// `Authorization: Bearer` from the first source that yields a token.
    Bearer(&'static [TokenSource]),
    /// `Cookie` header from the manual setting or the cookie cache.
    Cookie,
}

/// A GET whose JSON response names the id the usage URL needs.
#[derive(Debug, Clone, Copy)]
pub struct UrlLookup {
    /// Lookup endpoint, sent with the same authentication.
    pub url: &'static str,
    /// JSON pointer to the id in the lookup response.
    pub pointer: &'static str,
}

/// Declarative description of an HTTP strategy.
#[derive(Debug, Clone)]
pub struct HttpSpec {
    /// Strategy identifier.
    pub id: &'static str,
    /// `OAuth`, `ApiToken`, `Web` or `WebDashboard`.
    pub kind: FetchKind,
    /// Endpoint URL. With a `lookup`, `{id}` is replaced by the looked-up
    /// value.
    pub url: &'static str,
    /// Request made first to resolve the `{id}` in `url`.
    pub lookup: Option<UrlLookup>,
    /// Request method.
    pub method: HttpMethod,
    /// JSON body for POST requests.
    pub body: Option<&'static str>,
    /// Extra static headers.
    pub headers: &'static [(&'static str, &'static str)],
    /// Authentication.
    pub auth: HttpAuth,
    /// Parser for the response body.
    pub parser: UsageParser,
}

// ============================================================================
// Strategy
// ============================================================================

/// Makes one authenticated request and parses the body.
pub struct HttpStrategy {
    provider: ProviderKind,
    spec: HttpSpec,
    cookie_name: Option<String>,
    manual_cookie_only: bool,
}

impl HttpStrategy {
    /// Creates the strategy for a provider.
    pub fn new(metadata: &ProviderMetadata, spec: HttpSpec) -> Self {
        Self {
            provider: metadata.id,
            spec,
            cookie_name: metadata.cookie_name.clone(),
            manual_cookie_only: metadata.requires_manual_cookie_source,
        }
    }

    fn manual_cookie(ctx: &FetchContext) -> Option<&str> {
        ctx.settings
            .manual_cookie_header
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
    }

    /// Whether the cookie cache may be consulted under the current source.
    fn cache_allowed(&self, source: &CredentialSource) -> bool {
        match source {
            CredentialSource::Manual => false,
            CredentialSource::CookieHeader => true,
            _ => !self.manual_cookie_only,
        }
    }

    async fn resolve_cookie(&self, ctx: &FetchContext) -> Result<String, FetchError> {
        if let Some(manual) = Self::manual_cookie(ctx) {
            return Ok(normalize_cookie(manual, self.cookie_name.as_deref()));
        }
        if !self.cache_allowed(&ctx.settings.credential_source) {
            return Err(FetchError::CredentialUnavailable(format!(
                "{} needs a manually configured cookie header",
                self.provider.display_name()
            )));
        }
        match ctx.cookies.load(self.provider).await {
            Some(cached) => {
                debug!(source = %cached.source_label, stored_at = %cached.stored_at, "Using cached cookie");
                Ok(normalize_cookie(&cached.cookie, self.cookie_name.as_deref()))
            }
            None => Err(FetchError::CredentialUnavailable(format!(
                "no cached cookie for {}",
                self.provider.display_name()
            ))),
        }
    }

    async fn resolve_token(
        &self,
        ctx: &FetchContext,
        sources: &[TokenSource],
    ) -> Result<String, FetchError> {
        if self.spec.kind == FetchKind::ApiToken {
            if let Some(key) = ctx.settings.credential_source.env_key() {
                return ctx
                    .env_var(key)
                    .ok_or_else(|| FetchError::CredentialUnavailable(format!("{key} is not set")));
            }
        }

        let mut keychain_error: Option<KeychainError> = None;
        for source in sources {
            let token = match source {
                TokenSource::Env(key) => ctx.env_var(key),
                TokenSource::Keychain {
                    service,
                    account,
                    pointer,
                } => match ctx.credentials.read_secret(service, account).await {
                    Ok(secret) => secret.and_then(|s| match pointer {
                        Some(ptr) => json_string_at(&s, ptr),
                        None => Some(s),
                    }),
                    Err(e) => {
                        warn!(service, error = %e, "Keychain read failed");
                        keychain_error = Some(e);
                        None
                    }
                },
                TokenSource::JsonFile { path, pointer } => match path() {
                    Some(path) => tokio::fs::read_to_string(&path)
                        .await
                        .ok()
                        .and_then(|content| json_string_at(&content, pointer)),
                    None => None,
                },
            };
            if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
                debug!(source = ?source, "Resolved bearer token");
                return Ok(token.trim().to_string());
            }
        }

        match keychain_error {
            Some(e) => Err(e.into()),
            None => Err(FetchError::CredentialUnavailable(format!(
                "no {} token for {}",
                self.spec.kind.label(),
                self.provider.display_name()
            ))),
        }
    }
}

impl HttpStrategy {
    async fn lookup_id(
        &self,
        ctx: &FetchContext,
        lookup: UrlLookup,
        auth: &(&'static str, String),
    ) -> Result<String, FetchError> {
        let request = HttpRequest::get(lookup.url)
            .header("Accept", "application/json")
            .header(auth.0, auth.1.clone());
        let response = ctx.http.request(request).await?;
        if let Some(error) = FetchError::from_status(response.status, response.retry_after, &response.body)
        {
            return Err(error);
        }
        let id = json_string_at(&response.body, lookup.pointer).ok_or_else(|| {
            FetchError::InvalidResponse(format!(
                "{} lookup response has no {}",
                self.provider.display_name(),
                lookup.pointer
            ))
        })?;
        debug!(lookup = lookup.url, "Resolved URL id");
        Ok(id)
    }
}

#[async_trait]
impl FetchStrategy for HttpStrategy {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn kind(&self) -> FetchKind {
        self.spec.kind
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        // Token lookups may prompt for keychain access, so they happen in
        // fetch. Only the cheap cookie-policy check runs here.
        match self.spec.auth {
            HttpAuth::Bearer(_) => true,
            HttpAuth::Cookie => {
                Self::manual_cookie(ctx).is_some()
                    || self.cache_allowed(&ctx.settings.credential_source)
            }
        }
    }

    #[instrument(skip(self, ctx), fields(provider = %self.provider, strategy = self.spec.id, kind = %self.spec.kind))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let auth = match self.spec.auth {
            HttpAuth::Bearer(sources) => {
                let token = self.resolve_token(ctx, sources).await?;
                ("Authorization", format!("Bearer {token}"))
            }
            HttpAuth::Cookie => ("Cookie", self.resolve_cookie(ctx).await?),
        };

        let url = match self.spec.lookup {
            Some(lookup) => {
                let id = self.lookup_id(ctx, lookup, &auth).await?;
                self.spec.url.replace("{id}", &id)
            }
            None => self.spec.url.to_string(),
        };

        let mut request = match self.spec.method {
            HttpMethod::Get => HttpRequest::get(url),
            HttpMethod::Post => HttpRequest::post_json(url, self.spec.body.unwrap_or("{}")),
        }
        .header("Accept", "application/json");

        for (name, value) in self.spec.headers {
            request = request.header(*name, *value);
        }
        request = request.header(auth.0, auth.1);

        let response = ctx.http.request(request).await?;
        debug!(status = response.status, bytes = response.body.len(), "HTTP response");

        if let Some(error) = FetchError::from_status(response.status, response.retry_after, &response.body)
        {
            return Err(error);
        }

        finish(
            self.provider,
            self.spec.parser,
            &response.body,
            self.spec.id,
            self.spec.kind,
        )
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Strips a leading `Cookie:` and names a bare value after `cookie_name`.
fn normalize_cookie(raw: &str, cookie_name: Option<&str>) -> String {
    let trimmed = raw.trim();
    let value = match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("cookie:") => trimmed[7..].trim(),
        _ => trimmed,
    };
    match cookie_name {
        Some(name) if !value.contains('=') => format!("{name}={value}"),
        _ => value.to_string(),
    }
}

fn json_string_at(document: &str, pointer: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(document).ok()?;
    value.pointer(pointer)?.as_str().map(str::to_string)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meterbar_core::{RateWindow, UsageSnapshot};
    use meterbar_fetch::testing::{self, ScriptedHttp, StaticCookies, StaticCredentials};
    use meterbar_fetch::FetchSettings;

    const URL: &str = "https://api.example.test/usage";

    fn parse_used(body: &str) -> Result<UsageSnapshot, FetchError> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = value["used"].as_f64().map(RateWindow::new);
        Ok(snapshot)
    }

    fn metadata(manual_only: bool) -> ProviderMetadata {
        let mut meta = ProviderMetadata::for_provider(ProviderKind::Cursor);
        meta.requires_manual_cookie_source = manual_only;
        meta.cookie_name = Some("session".to_string());
        meta
    }

    fn cookie_spec() -> HttpSpec {
        HttpSpec {
            id: "cursor.web",
            kind: FetchKind::Web,
            url: URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth: HttpAuth::Cookie,
            parser: parse_used,
        }
    }

    const ENV_SOURCES: &[TokenSource] = &[TokenSource::Env("EXAMPLE_TOKEN")];
    const KEYCHAIN_SOURCES: &[TokenSource] = &[TokenSource::Keychain {
        service: "example",
        account: "default",
        pointer: Some("/oauth/accessToken"),
    }];

    fn bearer_spec(kind: FetchKind, sources: &'static [TokenSource]) -> HttpSpec {
        HttpSpec {
            id: "example.token",
            kind,
            url: URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[("x-client", "meterbar")],
            auth: HttpAuth::Bearer(sources),
            parser: parse_used,
        }
    }

    fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
        request
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_normalize_cookie() {
        assert_eq!(normalize_cookie("Cookie: a=1; b=2", None), "a=1; b=2");
        assert_eq!(normalize_cookie("  abc123 ", Some("sessionKey")), "sessionKey=abc123");
        assert_eq!(normalize_cookie("sessionKey=abc", Some("sessionKey")), "sessionKey=abc");
    }

    #[tokio::test]
    async fn test_env_token_sent_as_bearer() {
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 200, r#"{"used": 42}"#));
        let ctx = testing::builder()
            .http(http.clone())
            .env("EXAMPLE_TOKEN", "tok-1")
            .build();
        let strategy = HttpStrategy::new(&metadata(false), bearer_spec(FetchKind::ApiToken, ENV_SOURCES));

        let result = strategy.fetch(&ctx).await.unwrap();
        assert!((result.snapshot.primary.unwrap().used_percent - 42.0).abs() < f64::EPSILON);

        let requests = http.requests();
        assert_eq!(header(&requests[0], "authorization"), Some("Bearer tok-1"));
        assert_eq!(header(&requests[0], "x-client"), Some("meterbar"));
    }

    #[tokio::test]
    async fn test_environment_source_pins_variable() {
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 200, r#"{"used": 1}"#));
        let ctx = testing::builder()
            .http(http.clone())
            .env("EXAMPLE_TOKEN", "default")
            .env("OTHER_KEY", "pinned")
            .settings(FetchSettings {
                credential_source: CredentialSource::Environment("OTHER_KEY".to_string()),
                ..FetchSettings::default()
            })
            .build();
        let strategy = HttpStrategy::new(&metadata(false), bearer_spec(FetchKind::ApiToken, ENV_SOURCES));

        strategy.fetch(&ctx).await.unwrap();
        assert_eq!(header(&http.requests()[0], "authorization"), Some("Bearer pinned"));
    }

    #[tokio::test]
    async fn test_missing_token_is_unavailable() {
        let ctx = testing::context();
        let strategy = HttpStrategy::new(&metadata(false), bearer_spec(FetchKind::OAuth, ENV_SOURCES));
        let err = strategy.fetch(&ctx).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_keychain_json_pointer() {
        let creds = StaticCredentials::default().with(
            "example",
            "default",
            r#"{"oauth": {"accessToken": "kc-token"}}"#,
        );
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 200, r#"{"used": 5}"#));
        let ctx = testing::builder()
            .credentials(Arc::new(creds))
            .http(http.clone())
            .build();
        let strategy = HttpStrategy::new(&metadata(false), bearer_spec(FetchKind::OAuth, KEYCHAIN_SOURCES));

        strategy.fetch(&ctx).await.unwrap();
        assert_eq!(header(&http.requests()[0], "authorization"), Some("Bearer kc-token"));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth_failure() {
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 401, "nope"));
        let ctx = testing::builder()
            .http(http)
            .env("EXAMPLE_TOKEN", "tok")
            .build();
        let strategy = HttpStrategy::new(&metadata(false), bearer_spec(FetchKind::ApiToken, ENV_SOURCES));
        let err = strategy.fetch(&ctx).await.unwrap_err();
        assert!(matches!(err, FetchError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_cached_cookie_used_when_allowed() {
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 200, r#"{"used": 10}"#));
        let cookies = StaticCookies::default().with(ProviderKind::Cursor, "raw-value");
        let ctx = testing::builder()
            .http(http.clone())
            .cookies(Arc::new(cookies))
            .build();
        let strategy = HttpStrategy::new(&metadata(false), cookie_spec());

        assert!(strategy.is_available(&ctx).await);
        strategy.fetch(&ctx).await.unwrap();
        assert_eq!(header(&http.requests()[0], "cookie"), Some("session=raw-value"));
    }

    #[tokio::test]
    async fn test_manual_only_provider_ignores_cache_under_auto() {
        let cookies = StaticCookies::default().with(ProviderKind::Cursor, "cached=1");
        let ctx = testing::builder().cookies(Arc::new(cookies)).build();
        let strategy = HttpStrategy::new(&metadata(true), cookie_spec());

        assert!(!strategy.is_available(&ctx).await);
        let err = strategy.fetch(&ctx).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_manual_only_provider_uses_manual_header() {
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 200, r#"{"used": 3}"#));
        let ctx = testing::builder()
            .http(http.clone())
            .settings(FetchSettings {
                manual_cookie_header: Some("Cookie: session=manual".to_string()),
                ..FetchSettings::default()
            })
            .build();
        let strategy = HttpStrategy::new(&metadata(true), cookie_spec());

        assert!(strategy.is_available(&ctx).await);
        strategy.fetch(&ctx).await.unwrap();
        assert_eq!(header(&http.requests()[0], "cookie"), Some("session=manual"));
    }

    #[tokio::test]
    async fn test_explicit_cookie_source_reads_cache_for_manual_only_provider() {
        let http = Arc::new(ScriptedHttp::default().with_response(URL, 200, r#"{"used": 3}"#));
        let cookies = StaticCookies::default().with(ProviderKind::Cursor, "session=cached");
        let ctx = testing::builder()
            .http(http.clone())
            .cookies(Arc::new(cookies))
            .settings(FetchSettings {
                credential_source: CredentialSource::CookieHeader,
                ..FetchSettings::default()
            })
            .build();
        let strategy = HttpStrategy::new(&metadata(true), cookie_spec());

        strategy.fetch(&ctx).await.unwrap();
        assert_eq!(header(&http.requests()[0], "cookie"), Some("session=cached"));
    }

    const ORGS_URL: &str = "https://api.example.test/orgs";

    fn lookup_spec() -> HttpSpec {
        HttpSpec {
            id: "cursor.web",
            url: "https://api.example.test/orgs/{id}/usage",
            lookup: Some(UrlLookup {
                url: ORGS_URL,
                pointer: "/0/uuid",
            }),
            ..cookie_spec()
        }
    }

    #[tokio::test]
    async fn test_lookup_resolves_url_id() {
        let http = Arc::new(
            ScriptedHttp::default()
                .with_response(ORGS_URL, 200, r#"[{"uuid": "org-7"}]"#)
                .with_response("https://api.example.test/orgs/org-7/usage", 200, r#"{"used": 9}"#),
        );
        let ctx = testing::builder()
            .http(http.clone())
            .settings(FetchSettings {
                manual_cookie_header: Some("session=abc".to_string()),
                ..FetchSettings::default()
            })
            .build();
        let strategy = HttpStrategy::new(&metadata(true), lookup_spec());

        let result = strategy.fetch(&ctx).await.unwrap();
        assert!((result.snapshot.primary.unwrap().used_percent - 9.0).abs() < f64::EPSILON);

        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, ORGS_URL);
        assert_eq!(header(&requests[0], "cookie"), Some("session=abc"));
        assert_eq!(header(&requests[1], "cookie"), Some("session=abc"));
    }

    #[tokio::test]
    async fn test_lookup_without_id_is_invalid_response() {
        let http = Arc::new(ScriptedHttp::default().with_response(ORGS_URL, 200, "[]"));
        let ctx = testing::builder()
            .http(http.clone())
            .settings(FetchSettings {
                manual_cookie_header: Some("session=abc".to_string()),
                ..FetchSettings::default()
            })
            .build();
        let strategy = HttpStrategy::new(&metadata(true), lookup_spec());

        let err = strategy.fetch(&ctx).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse(_)));
        assert_eq!(http.requests().len(), 1);
    }
}
