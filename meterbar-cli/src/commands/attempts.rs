//! Attempts command - refresh, then show which strategies ran.

use anyhow::Result;
use meterbar_store::{RefreshCoordinator, RefreshOutcome};

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the attempts command.
pub async fn run(coordinator: &RefreshCoordinator, cli: &Cli) -> Result<ExitCode> {
    let providers = super::selected(coordinator, cli.provider.as_deref()).await?;
    let outcomes = coordinator.refresh_all(&providers).await;

    let mut rows = Vec::with_capacity(providers.len());
    for provider in &providers {
        rows.push((*provider, coordinator.fetch_attempts(*provider).await));
    }

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            let blocks: Vec<String> = rows
                .iter()
                .map(|(provider, attempts)| {
                    formatter.format_attempts(coordinator.registry().descriptor(*provider), attempts)
                })
                .collect();
            println!("{}", blocks.join("\n\n"));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_attempts(&rows)?);
        }
    }

    Ok(ExitCode::from_data(outcomes.iter().any(RefreshOutcome::is_success)))
}
