//! Fetch context providing access to host collaborators.
//!
//! The context is passed to every strategy. It bundles the credential
//! store, CLI runner, HTTP client and cookie cache behind trait objects,
//! plus the per-provider fetch settings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use meterbar_core::{CredentialSource, TokenAccount};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::host::{
    CliRunner, CookieCache, CredentialStore, HttpApi, HttpClient, JsonCookieCache, ProcessRunner,
    SystemKeychain,
};

// ============================================================================
// Source Mode
// ============================================================================

/// User pin restricting which strategy kinds run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Run every strategy in declared order.
    #[default]
    Auto,
    /// Only CLI strategies.
    Cli,
    /// Only cookie-based web strategies.
    Web,
    /// Only OAuth strategies.
    #[serde(rename = "oauth")]
    OAuth,
    /// Only API-token strategies.
    Api,
}

impl std::str::FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cli" => Ok(Self::Cli),
            "web" => Ok(Self::Web),
            "oauth" => Ok(Self::OAuth),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown source mode: {other}")),
        }
    }
}

// ============================================================================
// Fetch Settings
// ============================================================================

/// Per-provider settings a refresh runs with.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Which strategy kinds may run.
    pub source_mode: SourceMode,
    /// Which credential the refresh may use.
    pub credential_source: CredentialSource,
    /// Manually supplied `Cookie` header.
    pub manual_cookie_header: Option<String>,
    /// Overrides the strategy timeout when set.
    pub timeout: Option<Duration>,
    /// Stored accounts; each one is refreshed separately.
    pub token_accounts: Vec<TokenAccount>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            source_mode: SourceMode::Auto,
            credential_source: CredentialSource::Auto,
            manual_cookie_header: None,
            timeout: None,
            token_accounts: Vec::new(),
        }
    }
}

// ============================================================================
// Fetch Context
// ============================================================================

/// Context provided to fetch strategies.
#[derive(Clone)]
pub struct FetchContext {
    /// Secure credential storage.
    pub credentials: Arc<dyn CredentialStore>,
    /// CLI tool runner.
    pub runner: Arc<dyn CliRunner>,
    /// HTTP client.
    pub http: Arc<dyn HttpApi>,
    /// Cached cookie headers.
    pub cookies: Arc<dyn CookieCache>,
    /// Settings for this refresh.
    pub settings: FetchSettings,
    env_overrides: Arc<HashMap<String, String>>,
}

impl FetchContext {
    /// Creates a context backed by the real system collaborators.
    ///
    /// HTTP requests are limited to the hosts of `endpoints`, so credentials
    /// are only ever sent to a registered provider endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn system(endpoints: &[&str]) -> Result<Self, FetchError> {
        let http = HttpClient::new()?.with_allowed_endpoints(endpoints);
        Ok(Self::builder().http(Arc::new(http)).build())
    }

    /// Creates a builder for customizing the context.
    pub fn builder() -> FetchContextBuilder {
        FetchContextBuilder::new()
    }

    /// Returns a context sharing these collaborators with different settings.
    #[must_use]
    pub fn with_settings(&self, settings: FetchSettings) -> Self {
        Self {
            settings,
            ..self.clone()
        }
    }

    /// Returns a context where `key` reads as `value`.
    #[must_use]
    pub fn with_env(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut env = (*self.env_overrides).clone();
        env.insert(key.into(), value.into());
        Self {
            env_overrides: Arc::new(env),
            ..self.clone()
        }
    }

    /// Reads an environment variable, honoring test overrides.
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env_overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
            .filter(|v| !v.trim().is_empty())
    }

    /// The effective timeout for a strategy declaring `declared`.
    pub fn strategy_timeout(&self, declared: Duration) -> Duration {
        self.settings.timeout.unwrap_or(declared)
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Fetch Context Builder
// ============================================================================

/// Builder for constructing a `FetchContext`.
///
/// Collaborators left unset fall back to the system implementations,
/// except HTTP which falls back to a client with default settings.
#[derive(Default)]
pub struct FetchContextBuilder {
    credentials: Option<Arc<dyn CredentialStore>>,
    runner: Option<Arc<dyn CliRunner>>,
    http: Option<Arc<dyn HttpApi>>,
    cookies: Option<Arc<dyn CookieCache>>,
    settings: FetchSettings,
    env_overrides: HashMap<String, String>,
}

impl FetchContextBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the credential store.
    #[must_use]
    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the CLI runner.
    #[must_use]
    pub fn runner(mut self, runner: Arc<dyn CliRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Sets the HTTP client.
    #[must_use]
    pub fn http(mut self, http: Arc<dyn HttpApi>) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets the cookie cache.
    #[must_use]
    pub fn cookies(mut self, cookies: Arc<dyn CookieCache>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Sets the fetch settings.
    #[must_use]
    pub fn settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the source mode.
    #[must_use]
    pub fn source_mode(mut self, mode: SourceMode) -> Self {
        self.settings.source_mode = mode;
        self
    }

    /// Sets the timeout override.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    /// Overrides an environment variable for this context only.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    /// Builds the fetch context.
    pub fn build(self) -> FetchContext {
        FetchContext {
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(SystemKeychain::new())),
            runner: self.runner.unwrap_or_else(|| Arc::new(ProcessRunner::new())),
            http: self.http.unwrap_or_else(|| Arc::new(crate::host::UnconfiguredHttp)),
            cookies: self
                .cookies
                .unwrap_or_else(|| Arc::new(JsonCookieCache::default_location())),
            settings: self.settings,
            env_overrides: Arc::new(self.env_overrides),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let ctx = FetchContext::builder()
            .source_mode(SourceMode::Cli)
            .timeout(Duration::from_secs(60))
            .build();

        assert_eq!(ctx.settings.source_mode, SourceMode::Cli);
        assert_eq!(ctx.strategy_timeout(Duration::from_secs(5)), Duration::from_secs(60));
    }

    #[test]
    fn test_with_settings_keeps_collaborators() {
        let ctx = FetchContext::builder().env("METERBAR_TEST_KEY", "abc").build();
        let pinned = ctx.with_settings(FetchSettings {
            credential_source: CredentialSource::ApiToken,
            ..FetchSettings::default()
        });
        assert_eq!(pinned.settings.credential_source, CredentialSource::ApiToken);
        assert_eq!(pinned.env_var("METERBAR_TEST_KEY").as_deref(), Some("abc"));
        assert!(Arc::ptr_eq(&ctx.http, &pinned.http));
    }

    #[test]
    fn test_with_env_leaves_original_untouched() {
        let ctx = FetchContext::builder().build();
        let account = ctx.with_env("METERBAR_ACCOUNT_KEY", "tok");
        assert_eq!(account.env_var("METERBAR_ACCOUNT_KEY").as_deref(), Some("tok"));
        assert!(ctx.env_var("METERBAR_ACCOUNT_KEY").is_none());
    }

    #[test]
    fn test_blank_env_is_absent() {
        let ctx = FetchContext::builder().env("METERBAR_BLANK", "  ").build();
        assert!(ctx.env_var("METERBAR_BLANK").is_none());
    }

    #[test]
    fn test_source_mode_parse() {
        assert_eq!("OAuth".parse::<SourceMode>().unwrap(), SourceMode::OAuth);
        assert_eq!("api".parse::<SourceMode>().unwrap(), SourceMode::Api);
        assert!("browser".parse::<SourceMode>().is_err());
    }
}
