//! CLI-backed strategy.

use std::time::Duration;

use async_trait::async_trait;
use meterbar_core::ProviderKind;
use meterbar_fetch::{FetchContext, FetchError, FetchKind, FetchResult, FetchStrategy};
use tracing::{debug, instrument};

use super::{UsageParser, finish};

/// Declarative description of a CLI strategy.
#[derive(Debug, Clone)]
pub struct CliSpec {
    /// Strategy identifier.
    pub id: &'static str,
    /// Executable name, resolved on `PATH`.
    pub command: &'static str,
    /// Arguments that make the tool print usage.
    pub args: &'static [&'static str],
    /// Parser for stdout.
    pub parser: UsageParser,
    /// How long the tool may run.
    pub timeout: Duration,
}

/// Runs a provider's CLI and parses its stdout.
///
/// Availability is a `PATH` lookup, so a missing tool is recorded as
/// unavailable rather than failed.
pub struct CliStrategy {
    provider: ProviderKind,
    spec: CliSpec,
}

impl CliStrategy {
    /// Creates the strategy.
    pub fn new(provider: ProviderKind, spec: CliSpec) -> Self {
        Self { provider, spec }
    }
}

#[async_trait]
impl FetchStrategy for CliStrategy {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn kind(&self) -> FetchKind {
        FetchKind::Cli
    }

    fn timeout(&self) -> Duration {
        self.spec.timeout
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        let found = ctx.runner.command_exists(self.spec.command).await;
        debug!(command = self.spec.command, found, "CLI lookup");
        found
    }

    #[instrument(skip(self, ctx), fields(provider = %self.provider, strategy = self.spec.id))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let timeout = ctx.strategy_timeout(self.spec.timeout);
        let output = ctx
            .runner
            .run(self.spec.command, self.spec.args, timeout)
            .await?;

        let stdout = output.stdout_if_success()?;

        debug!(bytes = stdout.len(), duration = ?output.duration, "CLI output received");
        finish(self.provider, self.spec.parser, stdout, self.spec.id, FetchKind::Cli)
    }
}

// ============================================================================
// Tests
// ============================================================================
