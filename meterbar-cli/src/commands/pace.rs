//! Pace command - weekly burn rate of providers that report one.

use anyhow::Result;
use chrono::Utc;
use meterbar_store::RefreshCoordinator;
use tracing::info;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the pace command.
///
/// Providers without pace support are skipped unless named explicitly.
pub async fn run(coordinator: &RefreshCoordinator, cli: &Cli) -> Result<ExitCode> {
    let mut providers = super::selected(coordinator, cli.provider.as_deref()).await?;
    if cli.provider.is_none() {
        providers.retain(|p| coordinator.registry().descriptor(*p).supports_pace());
    }
    info!(providers = ?providers, "Computing weekly pace");

    coordinator.refresh_all(&providers).await;

    let now = Utc::now();
    let mut rows = Vec::with_capacity(providers.len());
    for provider in providers {
        let detail = coordinator.weekly_detail(provider, now).await;
        let summary = coordinator.weekly_summary(provider, now).await;
        rows.push((provider, detail, summary));
    }

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);
            for (provider, detail, _) in &rows {
                let desc = coordinator.registry().descriptor(*provider);
                println!("{}", formatter.format_pace(desc, detail.as_ref()));
            }
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_pace(&rows)?);
        }
    }

    Ok(ExitCode::from_data(rows.iter().any(|(_, detail, _)| detail.is_some())))
}
