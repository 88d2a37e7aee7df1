//! Cache maintenance command.

use anyhow::Result;
use tracing::info;

use meterbar_store::RefreshCoordinator;

use crate::{Cli, ExitCode, OutputFormat};

/// Clears cached token cost data, in memory and on disk.
pub async fn clear(coordinator: &RefreshCoordinator, cli: &Cli) -> Result<ExitCode> {
    if let Some(e) = coordinator.clear_cost_usage_cache().await {
        return Err(e.into());
    }
    info!("Cost usage cache cleared");
    report(cli, "cleared", "Cost usage cache cleared");
    Ok(ExitCode::Success)
}

fn report(cli: &Cli, status: &str, message: &str) {
    if cli.quiet {
        return;
    }
    match cli.format {
        OutputFormat::Text => println!("{message}"),
        OutputFormat::Json => println!(r#"{{"status":"{status}"}}"#),
    }
}
