//! Provider registry.
//!
//! Built once at startup and shared read-only (usually behind an `Arc`).
//! It is the only place that knows which descriptors exist.

use chrono::{DateTime, Utc};
use meterbar_core::{CredentialSource, PacePolicy, ProviderKind, RateWindow, UsagePace, UsageSnapshot};
use meterbar_fetch::{
    FetchContext, FetchError, FetchOutcome, FetchPipeline, FetchResult, FetchSettings,
};
use tracing::{debug, info, instrument};

use crate::accounts::merge_account_snapshots;
use crate::augment::augment_descriptor;
use crate::claude::claude_descriptor;
use crate::codex::codex_descriptor;
use crate::copilot::copilot_descriptor;
use crate::cursor::cursor_descriptor;
use crate::descriptor::ProviderDescriptor;
use crate::error::ProviderError;
use crate::factory::factory_descriptor;
use crate::gemini::gemini_descriptor;
use crate::kiro::kiro_descriptor;
use crate::minimax::minimax_descriptor;
use crate::strategies::StrategySpec;
use crate::zai::zai_descriptor;

/// All descriptors, ordered by importance:
/// primary providers, IDE providers, then the rest.
fn init_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        // Primary providers
        codex_descriptor(),
        claude_descriptor(),
        // IDE providers
        cursor_descriptor(),
        copilot_descriptor(),
        // Other providers
        gemini_descriptor(),
        factory_descriptor(),
        zai_descriptor(),
        augment_descriptor(),
        kiro_descriptor(),
        minimax_descriptor(),
    ]
}

// ============================================================================
// Provider Registry
// ============================================================================

/// Registry of all provider descriptors.
pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Creates the registry with every built-in provider.
    pub fn new() -> Self {
        Self {
            descriptors: init_descriptors(),
        }
    }

    /// Returns all provider descriptors in registry order.
    pub fn all(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    /// Returns the descriptor for `kind`.
    ///
    /// # Panics
    ///
    /// Panics if no descriptor is registered for `kind`. Every
    /// [`ProviderKind`] is registered, so this only fires on a broken build.
    pub fn descriptor(&self, kind: ProviderKind) -> &ProviderDescriptor {
        self.try_descriptor(kind).unwrap_or_else(|| {
            panic!("no descriptor registered for provider {kind:?}; the registry is incomplete")
        })
    }

    /// Returns the descriptor for `kind`, if registered.
    pub fn try_descriptor(&self, kind: ProviderKind) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.id == kind)
    }

    /// Looks up a provider by CLI name or alias, ignoring case.
    pub fn by_cli_name(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.descriptors.iter().find(|d| d.cli.matches(name))
    }

    /// Resolves a user-supplied provider name.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::UnknownProvider` when nothing matches.
    pub fn resolve(&self, name: &str) -> Result<&ProviderDescriptor, ProviderError> {
        self.by_cli_name(name)
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    /// Returns all provider kinds in registry order.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.descriptors.iter().map(|d| d.id).collect()
    }

    /// Returns the kinds enabled when the user has not chosen any.
    pub fn default_enabled(&self) -> Vec<ProviderKind> {
        self.descriptors
            .iter()
            .filter(|d| d.metadata.default_enabled)
            .map(|d| d.id)
            .collect()
    }

    /// Builds the pipeline for `kind` under the context's settings.
    pub fn build_pipeline(&self, kind: ProviderKind, ctx: &FetchContext) -> FetchPipeline {
        self.descriptor(kind).build_pipeline(&ctx.settings)
    }

    /// Runs the pipeline for `kind`, keeping the attempt history.
    ///
    /// With stored token accounts the pipeline runs once per account, in
    /// order, and the successful snapshots are merged into one result.
    #[instrument(skip(self, ctx), fields(provider = %kind.cli_name()))]
    pub async fn execute(&self, kind: ProviderKind, ctx: &FetchContext) -> FetchOutcome {
        let descriptor = self.descriptor(kind);
        let outcome = if descriptor.runs_per_account(&ctx.settings) {
            Self::execute_accounts(descriptor, ctx).await
        } else {
            descriptor.build_pipeline(&ctx.settings).execute(ctx).await
        };
        info!(
            success = outcome.is_success(),
            attempts = outcome.attempts.len(),
            "Provider refresh finished"
        );
        outcome
    }

    async fn execute_accounts(descriptor: &ProviderDescriptor, ctx: &FetchContext) -> FetchOutcome {
        let mut attempts = Vec::new();
        let mut duration = std::time::Duration::ZERO;
        let mut results: Vec<FetchResult> = Vec::new();
        let mut last_error = None;

        for account in &ctx.settings.token_accounts {
            let account_ctx = descriptor.account_context(ctx, account);
            let outcome = descriptor
                .build_pipeline(&account_ctx.settings)
                .execute(&account_ctx)
                .await;
            debug!(account = %account.label, success = outcome.is_success(), "Account refreshed");
            attempts.extend(outcome.attempts);
            duration += outcome.duration;
            match outcome.result {
                Ok(result) => results.push(result),
                Err(e) => last_error = Some(format!("{}: {e}", account.label)),
            }
        }

        let mut results = results.into_iter();
        let result = match results.next() {
            Some(first) => {
                let snapshots = std::iter::once(first.snapshot)
                    .chain(results.map(|r| r.snapshot))
                    .collect();
                let snapshot = merge_account_snapshots(snapshots).unwrap_or_default();
                Ok(FetchResult {
                    snapshot,
                    strategy_id: first.strategy_id,
                    kind: first.kind,
                })
            }
            None => Err(FetchError::AllStrategiesExhausted { last_error }),
        };
        FetchOutcome {
            result,
            attempts,
            duration,
        }
    }

    /// Every HTTP endpoint a registered strategy may call.
    pub fn endpoint_urls(&self) -> Vec<&'static str> {
        self.descriptors
            .iter()
            .flat_map(|d| &d.fetch_plan.strategies)
            .flat_map(|spec| match spec {
                StrategySpec::Http(http) => {
                    let mut urls = vec![http.url];
                    urls.extend(http.lookup.map(|l| l.url));
                    urls
                }
                _ => Vec::new(),
            })
            .collect()
    }

    /// Runs `kind` with `credential_source` replacing the context's own.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::AllStrategiesExhausted` when no strategy produced
    /// data.
    pub async fn run(
        &self,
        kind: ProviderKind,
        credential_source: CredentialSource,
        ctx: &FetchContext,
    ) -> Result<UsageSnapshot, FetchError> {
        let ctx = ctx.with_settings(FetchSettings {
            credential_source,
            ..ctx.settings.clone()
        });
        self.execute(kind, &ctx)
            .await
            .result
            .map(|result| result.snapshot)
    }

    /// Weekly pace for a provider's window, honoring its `supports_pace` flag.
    pub fn weekly_pace(
        &self,
        kind: ProviderKind,
        policy: &PacePolicy,
        window: &RateWindow,
        now: DateTime<Utc>,
    ) -> Option<UsagePace> {
        policy.weekly_pace(&self.descriptor(kind).metadata, window, now)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.kinds())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
