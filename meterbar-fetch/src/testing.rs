//! In-memory collaborators for tests.
//!
//! Enabled for this crate's own tests and, through the `testing` feature,
//! for downstream crates' tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use meterbar_core::ProviderKind;

use crate::context::{FetchContext, FetchContextBuilder};
use crate::error::{HttpError, KeychainError, ProcessError};
use crate::host::{
    CachedCookie, CliRunner, CookieCache, CredentialStore, HttpApi, HttpRequest, HttpResponse,
    ProcessOutput,
};

/// A context whose collaborators all report "nothing there".
pub fn context() -> FetchContext {
    builder().build()
}

/// A builder preloaded with empty in-memory collaborators.
pub fn builder() -> FetchContextBuilder {
    FetchContext::builder()
        .credentials(Arc::new(StaticCredentials::default()))
        .runner(Arc::new(ScriptedRunner::default()))
        .http(Arc::new(ScriptedHttp::default()))
        .cookies(Arc::new(StaticCookies::default()))
}

// ============================================================================
// Credentials
// ============================================================================

/// Credential store answering from a fixed map.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    secrets: HashMap<(String, String), String>,
}

impl StaticCredentials {
    /// Adds a secret.
    #[must_use]
    pub fn with(mut self, service: &str, account: &str, secret: &str) -> Self {
        self.secrets
            .insert((service.to_string(), account.to_string()), secret.to_string());
        self
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn read_secret(
        &self,
        service: &str,
        account: &str,
    ) -> Result<Option<String>, KeychainError> {
        Ok(self
            .secrets
            .get(&(service.to_string(), account.to_string()))
            .cloned())
    }
}

// ============================================================================
// CLI runner
// ============================================================================

/// CLI runner returning canned stdout per command.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outputs: HashMap<String, Result<String, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    resets: AtomicUsize,
}

impl ScriptedRunner {
    /// `cmd` exists and prints `stdout`.
    #[must_use]
    pub fn with_output(mut self, cmd: &str, stdout: &str) -> Self {
        self.outputs.insert(cmd.to_string(), Ok(stdout.to_string()));
        self
    }

    /// `cmd` exists and exits 1 with `stderr`.
    #[must_use]
    pub fn with_failure(mut self, cmd: &str, stderr: &str) -> Self {
        self.outputs.insert(cmd.to_string(), Err(stderr.to_string()));
        self
    }

    /// Every run sleeps this long first.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `run` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `reset_sessions` calls so far.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CliRunner for ScriptedRunner {
    async fn command_exists(&self, cmd: &str) -> bool {
        self.outputs.contains_key(cmd)
    }

    async fn run(
        &self,
        cmd: &str,
        _args: &[&str],
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.outputs.get(cmd) {
            Some(Ok(stdout)) => Ok(ProcessOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
                exit_code: 0,
                duration: Duration::ZERO,
            }),
            Some(Err(stderr)) => Ok(ProcessOutput {
                stdout: String::new(),
                stderr: stderr.clone(),
                exit_code: 1,
                duration: Duration::ZERO,
            }),
            None => Err(ProcessError::NotFound(cmd.to_string())),
        }
    }

    fn reset_sessions(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// HTTP client answering from a URL map and recording requests.
#[derive(Debug, Default)]
pub struct ScriptedHttp {
    responses: HashMap<String, (u16, String)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    /// Responds to `url` with `status` and `body`.
    #[must_use]
    pub fn with_response(mut self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpApi for ScriptedHttp {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let response = self.responses.get(&request.url).cloned();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let (status, body) = response.unwrap_or((404, "not found".to_string()));
        Ok(HttpResponse {
            status,
            body,
            retry_after: None,
        })
    }
}

// ============================================================================
// Cookies
// ============================================================================

/// Cookie cache answering from a fixed map.
#[derive(Debug, Default)]
pub struct StaticCookies {
    cookies: HashMap<ProviderKind, String>,
}

impl StaticCookies {
    /// Adds a cached cookie header.
    #[must_use]
    pub fn with(mut self, provider: ProviderKind, cookie: &str) -> Self {
        self.cookies.insert(provider, cookie.to_string());
        self
    }
}

#[async_trait]
impl CookieCache for StaticCookies {
    async fn load(&self, provider: ProviderKind) -> Option<CachedCookie> {
        self.cookies.get(&provider).map(|cookie| CachedCookie {
            cookie: cookie.clone(),
            source_label: "test".to_string(),
            stored_at: Utc::now(),
        })
    }
}
