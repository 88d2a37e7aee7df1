//! Provider descriptor system.
//!
//! A descriptor contains all the static configuration for a provider:
//! - Metadata (display name, labels, URLs, capability flags)
//! - Token cost configuration
//! - Fetch plan (ordered strategy specs)
//! - CLI configuration
//! - Environment keys, token account support and refresh cadence

use std::path::PathBuf;
use std::time::Duration;

use meterbar_core::{CredentialSource, ProviderKind, ProviderMetadata, TokenAccount};
use meterbar_fetch::{FetchContext, FetchPipeline, FetchSettings};
use tracing::debug;

use crate::strategies::StrategySpec;

/// Refresh cadence used when a descriptor does not set one.
pub const DEFAULT_REFRESH_CADENCE: Duration = Duration::from_secs(300);

// ============================================================================
// Provider Descriptor
// ============================================================================

/// Complete descriptor for a provider.
///
/// Immutable once registered. Everything the pipeline needs to know about a
/// provider lives here; nothing provider-specific is branched on elsewhere.
pub struct ProviderDescriptor {
    /// Provider identifier.
    pub id: ProviderKind,
    /// Display metadata and capability flags.
    pub metadata: ProviderMetadata,
    /// Token cost tracking configuration.
    pub token_cost: TokenCostConfig,
    /// How to fetch usage data.
    pub fetch_plan: FetchPlan,
    /// CLI tool configuration.
    pub cli: CliConfig,
    /// Environment variables that may carry an API token.
    pub env_keys: &'static [&'static str],
    /// How a stored token account reaches the strategies, if supported.
    pub token_accounts: Option<AccountInjection>,
    /// How long a snapshot stays fresh.
    pub refresh_cadence: Duration,
}

impl ProviderDescriptor {
    /// Creates a new descriptor builder.
    pub fn builder(id: ProviderKind) -> ProviderDescriptorBuilder {
        ProviderDescriptorBuilder::new(id)
    }

    /// Returns the display name.
    pub fn display_name(&self) -> &str {
        &self.metadata.display_name
    }

    /// Returns the CLI name.
    pub fn cli_name(&self) -> &str {
        self.cli.name
    }

    /// Whether the secondary window has weekly pace semantics.
    pub fn supports_pace(&self) -> bool {
        self.metadata.supports_pace
    }

    /// Whether local token cost scanning applies.
    pub fn supports_token_cost(&self) -> bool {
        self.token_cost.supports_token_cost
    }

    /// Whether refreshes run once per stored token account.
    pub fn runs_per_account(&self, settings: &FetchSettings) -> bool {
        self.token_accounts.is_some()
            && !settings.token_accounts.is_empty()
            && !settings.credential_source.is_off()
    }

    /// The context one stored account refreshes with.
    ///
    /// The account's credential is pinned so strategies that would read
    /// the ambient session (CLI, OAuth files) do not run for it.
    pub fn account_context(&self, ctx: &FetchContext, account: &TokenAccount) -> FetchContext {
        let mut settings = FetchSettings {
            token_accounts: Vec::new(),
            ..ctx.settings.clone()
        };
        match self.token_accounts {
            Some(AccountInjection::Environment(key)) => {
                settings.credential_source = CredentialSource::Environment(key.to_string());
                ctx.with_env(key, account.token.trim()).with_settings(settings)
            }
            Some(AccountInjection::CookieHeader) | None => {
                settings.credential_source = CredentialSource::Manual;
                settings.manual_cookie_header = Some(account.token.trim().to_string());
                ctx.with_settings(settings)
            }
        }
    }

    /// Builds the eligibility-filtered pipeline for these settings.
    ///
    /// Declared order is preserved. `Off` and filters that leave nothing
    /// produce a disabled pipeline whose exhaustion carries the reason.
    pub fn build_pipeline(&self, settings: &FetchSettings) -> FetchPipeline {
        if settings.credential_source.is_off() {
            return FetchPipeline::disabled(format!("{} is disabled", self.display_name()));
        }

        let strategies: Vec<_> = self
            .fetch_plan
            .strategies
            .iter()
            .filter(|spec| {
                spec.kind()
                    .is_eligible(settings.source_mode, &settings.credential_source)
            })
            .map(|spec| spec.instantiate(&self.metadata))
            .collect();

        debug!(
            provider = %self.id,
            source_mode = ?settings.source_mode,
            credential_source = %settings.credential_source,
            eligible = strategies.len(),
            declared = self.fetch_plan.strategies.len(),
            "Built fetch pipeline"
        );

        if strategies.is_empty() {
            return FetchPipeline::disabled(format!(
                "no {} strategy matches source mode {:?} with credential {}",
                self.display_name(),
                settings.source_mode,
                settings.credential_source
            ));
        }
        FetchPipeline::with_strategies(strategies)
    }
}

// ============================================================================
// Token Accounts
// ============================================================================

/// Where a stored account's token is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountInjection {
    /// As the manual `Cookie` header.
    CookieHeader,
    /// As the named environment variable.
    Environment(&'static str),
}

// ============================================================================
// Token Cost Config
// ============================================================================

/// Configuration for token cost tracking.
#[derive(Default)]
pub struct TokenCostConfig {
    /// Whether this provider supports token cost tracking.
    pub supports_token_cost: bool,
    /// Function to get the log directory for this provider.
    pub log_directory: Option<fn() -> Option<PathBuf>>,
}

impl TokenCostConfig {
    /// Resolves the log directory, if any.
    pub fn log_directory(&self) -> Option<PathBuf> {
        self.log_directory.and_then(|f| f())
    }
}

// ============================================================================
// Fetch Plan
// ============================================================================

/// Ordered strategy specs; order encodes preference.
#[derive(Default)]
pub struct FetchPlan {
    /// Strategy specs in preference order.
    pub strategies: Vec<StrategySpec>,
}

impl FetchPlan {
    /// Creates a plan from specs in preference order.
    pub fn new(strategies: Vec<StrategySpec>) -> Self {
        Self { strategies }
    }

    /// Strategy identifiers in declared order.
    pub fn strategy_ids(&self) -> Vec<&'static str> {
        self.strategies.iter().map(StrategySpec::id).collect()
    }
}

// ============================================================================
// CLI Config
// ============================================================================

/// Configuration for CLI tool integration.
pub struct CliConfig {
    /// Primary CLI name (used for `--provider`).
    pub name: &'static str,
    /// Alternative names/aliases.
    pub aliases: &'static [&'static str],
}

impl CliConfig {
    /// Returns true if `name` is this provider's name or an alias.
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ProviderDescriptor`].
pub struct ProviderDescriptorBuilder {
    id: ProviderKind,
    metadata: Option<ProviderMetadata>,
    token_cost: TokenCostConfig,
    fetch_plan: FetchPlan,
    aliases: &'static [&'static str],
    env_keys: &'static [&'static str],
    token_accounts: Option<AccountInjection>,
    refresh_cadence: Duration,
}

impl ProviderDescriptorBuilder {
    /// Creates a new builder for the given provider.
    pub fn new(id: ProviderKind) -> Self {
        Self {
            id,
            metadata: None,
            token_cost: TokenCostConfig::default(),
            fetch_plan: FetchPlan::default(),
            aliases: &[],
            env_keys: &[],
            token_accounts: None,
            refresh_cadence: DEFAULT_REFRESH_CADENCE,
        }
    }

    /// Sets the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: ProviderMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Enables token cost scanning of `log_directory`.
    #[must_use]
    pub fn token_cost(mut self, log_directory: fn() -> Option<PathBuf>) -> Self {
        self.token_cost = TokenCostConfig {
            supports_token_cost: true,
            log_directory: Some(log_directory),
        };
        self
    }

    /// Appends a strategy to the fetch plan.
    #[must_use]
    pub fn strategy(mut self, spec: StrategySpec) -> Self {
        self.fetch_plan.strategies.push(spec);
        self
    }

    /// Sets CLI aliases.
    #[must_use]
    pub fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    /// Sets the API token environment keys.
    #[must_use]
    pub fn env_keys(mut self, keys: &'static [&'static str]) -> Self {
        self.env_keys = keys;
        self
    }

    /// Enables stored token accounts.
    #[must_use]
    pub fn token_accounts(mut self, injection: AccountInjection) -> Self {
        self.token_accounts = Some(injection);
        self
    }

    /// Sets the refresh cadence.
    #[must_use]
    pub fn refresh_cadence(mut self, cadence: Duration) -> Self {
        self.refresh_cadence = cadence;
        self
    }

    /// Builds the descriptor.
    pub fn build(self) -> ProviderDescriptor {
        ProviderDescriptor {
            id: self.id,
            metadata: self
                .metadata
                .unwrap_or_else(|| ProviderMetadata::for_provider(self.id)),
            token_cost: self.token_cost,
            fetch_plan: self.fetch_plan,
            cli: CliConfig {
                name: self.id.cli_name(),
                aliases: self.aliases,
            },
            env_keys: self.env_keys,
            token_accounts: self.token_accounts,
            refresh_cadence: self.refresh_cadence,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterbar_core::{RateWindow, UsageSnapshot};
    use meterbar_fetch::{FetchError, FetchKind, HttpMethod, SourceMode};

    use crate::strategies::{CliSpec, HttpAuth, HttpSpec, LocalFileSpec, TokenSource};

    fn parse(_: &str) -> Result<UsageSnapshot, FetchError> {
        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = Some(RateWindow::new(1.0));
        Ok(snapshot)
    }

    fn http(id: &'static str, kind: FetchKind, auth: HttpAuth) -> StrategySpec {
        StrategySpec::Http(HttpSpec {
            id,
            kind,
            url: "https://example.test",
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth,
            parser: parse,
        })
    }

    fn descriptor() -> ProviderDescriptor {
        ProviderDescriptor::builder(ProviderKind::Claude)
            .strategy(http(
                "claude.oauth",
                FetchKind::OAuth,
                HttpAuth::Bearer(&[TokenSource::Env("T")]),
            ))
            .strategy(http("claude.web", FetchKind::Web, HttpAuth::Cookie))
            .strategy(http(
                "claude.api",
                FetchKind::ApiToken,
                HttpAuth::Bearer(&[TokenSource::Env("K")]),
            ))
            .strategy(StrategySpec::Cli(CliSpec {
                id: "claude.cli",
                command: "claude",
                args: &[],
                parser: parse,
                timeout: Duration::from_secs(1),
            }))
            .strategy(StrategySpec::LocalFile(LocalFileSpec {
                id: "claude.local",
                path: || None,
                parser: parse,
            }))
            .build()
    }

    fn settings(mode: SourceMode, source: CredentialSource) -> FetchSettings {
        FetchSettings {
            source_mode: mode,
            credential_source: source,
            ..FetchSettings::default()
        }
    }

    #[test]
    fn test_auto_keeps_declared_order() {
        let pipeline = descriptor().build_pipeline(&FetchSettings::default());
        assert_eq!(
            pipeline.strategy_ids(),
            vec!["claude.oauth", "claude.web", "claude.api", "claude.cli", "claude.local"]
        );
    }

    #[test]
    fn test_source_mode_pins_kind() {
        let desc = descriptor();
        let cli = desc.build_pipeline(&settings(SourceMode::Cli, CredentialSource::Auto));
        assert_eq!(cli.strategy_ids(), vec!["claude.cli"]);

        let web = desc.build_pipeline(&settings(SourceMode::Web, CredentialSource::Auto));
        assert_eq!(web.strategy_ids(), vec!["claude.web"]);
    }

    #[test]
    fn test_credential_source_filters() {
        let desc = descriptor();
        let manual = desc.build_pipeline(&settings(SourceMode::Auto, CredentialSource::Manual));
        assert_eq!(manual.strategy_ids(), vec!["claude.web"]);

        let oauth = desc.build_pipeline(&settings(SourceMode::Auto, CredentialSource::OAuthToken));
        assert_eq!(oauth.strategy_ids(), vec!["claude.oauth"]);

        let env = desc.build_pipeline(&settings(
            SourceMode::Auto,
            CredentialSource::Environment("K".to_string()),
        ));
        assert_eq!(env.strategy_ids(), vec!["claude.api"]);
    }

    #[tokio::test]
    async fn test_off_is_disabled_with_reason() {
        let pipeline = descriptor().build_pipeline(&settings(SourceMode::Auto, CredentialSource::Off));
        assert!(pipeline.is_empty());

        let ctx = meterbar_fetch::testing::context();
        let outcome = pipeline.execute(&ctx).await;
        assert!(outcome.attempts.is_empty());
        match outcome.result {
            Err(FetchError::AllStrategiesExhausted { last_error }) => {
                assert!(last_error.unwrap().contains("disabled"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_filters_leave_nothing() {
        let pipeline = descriptor().build_pipeline(&settings(SourceMode::Cli, CredentialSource::OAuthToken));
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_cookie_account_context_pins_manual_header() {
        let desc = ProviderDescriptor::builder(ProviderKind::Claude)
            .token_accounts(AccountInjection::CookieHeader)
            .build();
        let ctx = meterbar_fetch::testing::builder()
            .settings(FetchSettings {
                token_accounts: vec![TokenAccount::new("a", "x")],
                ..FetchSettings::default()
            })
            .build();
        assert!(desc.runs_per_account(&ctx.settings));

        let account = desc.account_context(&ctx, &TokenAccount::new("work", " sessionKey=abc "));
        assert_eq!(account.settings.credential_source, CredentialSource::Manual);
        assert_eq!(account.settings.manual_cookie_header.as_deref(), Some("sessionKey=abc"));
        assert!(account.settings.token_accounts.is_empty());
    }

    #[test]
    fn test_env_account_context_sets_variable() {
        let desc = ProviderDescriptor::builder(ProviderKind::Zai)
            .token_accounts(AccountInjection::Environment("ACCOUNT_TEST_KEY"))
            .build();
        let ctx = meterbar_fetch::testing::context();
        let account = desc.account_context(&ctx, &TokenAccount::new("team", "tok"));
        assert_eq!(
            account.settings.credential_source,
            CredentialSource::Environment("ACCOUNT_TEST_KEY".to_string())
        );
        assert_eq!(account.env_var("ACCOUNT_TEST_KEY").as_deref(), Some("tok"));
    }

    #[test]
    fn test_accounts_ignored_without_support_or_when_off() {
        let settings = FetchSettings {
            token_accounts: vec![TokenAccount::new("a", "x")],
            ..FetchSettings::default()
        };
        assert!(!ProviderDescriptor::builder(ProviderKind::Kiro).build().runs_per_account(&settings));

        let desc = ProviderDescriptor::builder(ProviderKind::Cursor)
            .token_accounts(AccountInjection::CookieHeader)
            .build();
        let off = FetchSettings {
            credential_source: CredentialSource::Off,
            ..settings
        };
        assert!(!desc.runs_per_account(&off));
    }

    #[test]
    fn test_builder_defaults() {
        let desc = ProviderDescriptor::builder(ProviderKind::Kiro).build();
        assert_eq!(desc.cli_name(), "kiro");
        assert_eq!(desc.refresh_cadence, DEFAULT_REFRESH_CADENCE);
        assert!(!desc.supports_token_cost());
        assert!(desc.token_cost.log_directory().is_none());
        assert!(desc.cli.matches("KIRO"));
    }
}
