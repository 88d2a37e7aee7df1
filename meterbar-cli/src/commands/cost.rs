//! Cost command - token usage from local session logs.

use anyhow::Result;
use clap::Args;
use meterbar_store::RefreshCoordinator;
use tracing::{info, warn};

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the cost command.
#[derive(Args)]
pub struct CostArgs {
    /// Rescan the logs even when the cached report is fresh.
    ///
    /// A stale report is always rescanned, since this process exits before a
    /// background scan could land.
    #[arg(long, short)]
    pub refresh: bool,
}

/// Runs the cost command.
///
/// Providers without local logs are skipped unless named explicitly.
pub async fn run(coordinator: &RefreshCoordinator, args: &CostArgs, cli: &Cli) -> Result<ExitCode> {
    let mut providers = super::selected(coordinator, cli.provider.as_deref()).await?;
    if cli.provider.is_none() {
        providers.retain(|p| coordinator.registry().descriptor(*p).supports_token_cost());
    }
    info!(providers = ?providers, refresh = args.refresh, "Building cost report");

    coordinator.load_cost_cache().await;

    let mut rows = Vec::with_capacity(providers.len());
    for provider in providers {
        let force = args.refresh || coordinator.is_token_stale(provider);
        match coordinator.cost_snapshot(provider, force).await {
            Some(snapshot) => rows.push((provider, snapshot)),
            None => warn!(provider = %provider, "Provider has no local token logs"),
        }
    }

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            let blocks: Vec<String> = rows
                .iter()
                .map(|(provider, snapshot)| {
                    formatter.format_cost(snapshot, coordinator.registry().descriptor(*provider))
                })
                .collect();
            println!("{}", blocks.join("\n\n"));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_costs(&rows)?);
        }
    }

    Ok(ExitCode::from_data(
        rows.iter().any(|(_, s)| s.last_30_days_tokens.is_some()),
    ))
}
