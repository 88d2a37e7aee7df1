//! Usage command - refresh and display provider usage.

use anyhow::Result;
use clap::Args;
use meterbar_fetch::SourceMode;
use meterbar_store::{RefreshCoordinator, RefreshOutcome};
use tracing::info;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the usage command.
#[derive(Args, Default)]
pub struct UsageArgs {
    /// Restrict strategies for this run (auto, cli, web, oauth, api).
    #[arg(long)]
    pub source: Option<SourceMode>,

    /// Per-strategy timeout in seconds for this run.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Runs the usage command.
pub async fn run(coordinator: &RefreshCoordinator, args: &UsageArgs, cli: &Cli) -> Result<ExitCode> {
    let providers = super::selected(coordinator, cli.provider.as_deref()).await?;
    info!(providers = ?providers, "Fetching usage");

    apply_overrides(coordinator, args, &providers).await;
    let outcomes = coordinator.refresh_all(&providers).await;

    print_outcomes(coordinator, &outcomes, cli)?;
    Ok(ExitCode::from_data(outcomes.iter().any(RefreshOutcome::is_success)))
}

/// Applies `--source` and `--timeout` to the in-memory settings only.
pub(crate) async fn apply_overrides(
    coordinator: &RefreshCoordinator,
    args: &UsageArgs,
    providers: &[meterbar_core::ProviderKind],
) {
    if args.source.is_none() && args.timeout.is_none() {
        return;
    }
    coordinator
        .settings()
        .update(|settings| {
            for provider in providers {
                let entry = settings.provider_settings.entry(*provider).or_default();
                if let Some(source) = args.source {
                    entry.source_mode = Some(source);
                }
                if let Some(timeout) = args.timeout {
                    entry.timeout_secs = Some(timeout);
                }
            }
        })
        .await;
}

/// Prints outcomes in the selected format.
pub(crate) fn print_outcomes(
    coordinator: &RefreshCoordinator,
    outcomes: &[RefreshOutcome],
    cli: &Cli,
) -> Result<()> {
    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            let blocks: Vec<String> = outcomes
                .iter()
                .map(|o| formatter.format_outcome(o, coordinator.registry().descriptor(o.provider)))
                .collect();
            println!("{}", blocks.join("\n\n"));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_outcomes(outcomes)?);
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterbar_core::ProviderKind;
    use meterbar_fetch::testing;
    use meterbar_store::SettingsStore;
    use std::sync::Arc;

    async fn coordinator(dir: &tempfile::TempDir) -> RefreshCoordinator {
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
        RefreshCoordinator::from_settings(settings, testing::context()).await
    }

    #[tokio::test]
    async fn test_overrides_apply_to_selected_providers_only() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir).await;
        let args = UsageArgs {
            source: Some(SourceMode::Cli),
            timeout: Some(5),
        };

        apply_overrides(&coordinator, &args, &[ProviderKind::Codex]).await;

        let settings = coordinator.settings().get().await;
        let codex = settings.provider(ProviderKind::Codex);
        assert_eq!(codex.source_mode, Some(SourceMode::Cli));
        assert_eq!(codex.timeout_secs, Some(5));
        assert_eq!(settings.provider(ProviderKind::Claude).source_mode, None);
        assert!(!dir.path().join("settings.json").exists());
    }

    #[tokio::test]
    async fn test_no_overrides_leave_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(&dir).await;
        let before = coordinator.settings().get().await;
        apply_overrides(&coordinator, &UsageArgs::default(), &[ProviderKind::Codex]).await;
        assert_eq!(coordinator.settings().get().await, before);
    }
}
