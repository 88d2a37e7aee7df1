//! Fetch strategy trait and types.
//!
//! A strategy is one way of obtaining usage data for a provider (CLI,
//! OAuth, cookie header, API token, local file). Providers declare an
//! ordered list of strategies and the pipeline tries them in that order.

use std::time::Duration;

use async_trait::async_trait;
use meterbar_core::{CredentialSource, FetchSource, UsageSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{FetchContext, SourceMode};
use crate::error::FetchError;

/// Timeout applied to a strategy that does not declare its own.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Fetch Kind
// ============================================================================

/// The kind of acquisition mechanism a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// CLI tool (e.g., `codex` rate-limit output)
    Cli,
    /// Cookie-authenticated web API
    Web,
    /// OAuth token authentication
    #[serde(rename = "oauth")]
    OAuth,
    /// API token authentication
    ApiToken,
    /// Local state file
    LocalFile,
    /// Cookie-authenticated dashboard page
    WebDashboard,
}

impl FetchKind {
    /// Short label used in attempt diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Web | Self::WebDashboard => "web",
            Self::OAuth => "oauth",
            Self::ApiToken => "api",
            Self::LocalFile => "local",
        }
    }

    /// Converts to the `FetchSource` recorded on snapshots.
    pub fn to_fetch_source(&self) -> FetchSource {
        match self {
            Self::Cli => FetchSource::Cli,
            Self::OAuth => FetchSource::OAuth,
            Self::Web | Self::WebDashboard => FetchSource::Web,
            Self::ApiToken => FetchSource::Api,
            Self::LocalFile => FetchSource::LocalFile,
        }
    }

    /// Returns true if strategies of this kind consume a cookie header.
    pub fn uses_cookie_header(&self) -> bool {
        matches!(self, Self::Web | Self::WebDashboard)
    }

    /// Returns true if the source mode lets this kind run.
    pub fn allowed_by_mode(&self, mode: SourceMode) -> bool {
        match mode {
            SourceMode::Auto => true,
            SourceMode::Cli => *self == Self::Cli,
            SourceMode::Web => self.uses_cookie_header(),
            SourceMode::OAuth => *self == Self::OAuth,
            SourceMode::Api => *self == Self::ApiToken,
        }
    }

    /// Returns true if the credential source lets this kind run.
    pub fn allowed_by_credential(&self, source: &CredentialSource) -> bool {
        match self {
            Self::Cli | Self::LocalFile => source.allows_ambient(),
            Self::Web | Self::WebDashboard => source.allows_cookie_header(),
            Self::OAuth => source.allows_oauth(),
            Self::ApiToken => source.allows_api_token(),
        }
    }

    /// Eligibility: both the source mode and the credential source allow it.
    pub fn is_eligible(&self, mode: SourceMode, source: &CredentialSource) -> bool {
        self.allowed_by_mode(mode) && self.allowed_by_credential(source)
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Fetch Result
// ============================================================================

/// The result of a successful strategy.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched usage snapshot.
    pub snapshot: UsageSnapshot,
    /// The strategy that produced it.
    pub strategy_id: String,
    /// The kind of fetch used.
    pub kind: FetchKind,
}

impl FetchResult {
    /// Creates a new fetch result, stamping the snapshot's fetch source.
    pub fn new(
        mut snapshot: UsageSnapshot,
        strategy_id: impl Into<String>,
        kind: FetchKind,
    ) -> Self {
        snapshot.fetch_source = kind.to_fetch_source();
        Self {
            snapshot,
            strategy_id: strategy_id.into(),
            kind,
        }
    }
}

// ============================================================================
// Fetch Strategy Trait
// ============================================================================

/// One way of fetching usage data for a provider.
///
/// `is_available` must be cheap and local (binary on PATH, credential
/// present). `fetch` may hit the network or spawn a process; it returns
/// `FetchError::CredentialUnavailable` when the credential turns out to be
/// missing only once the strategy runs.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Unique identifier, `{provider}.{method}` (e.g. `claude.oauth`).
    fn id(&self) -> &str;

    /// The kind of fetch this strategy uses.
    fn kind(&self) -> FetchKind;

    /// Upper bound for one `fetch` call.
    fn timeout(&self) -> Duration {
        DEFAULT_STRATEGY_TIMEOUT
    }

    /// Quick, local availability check.
    async fn is_available(&self, ctx: &FetchContext) -> bool;

    /// Fetch usage data.
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError>;
}

// ============================================================================
// Tests
// ============================================================================
