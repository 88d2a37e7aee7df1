//! Watch command - periodic refresh until interrupted.

use anyhow::Result;
use chrono::{Local, Utc};
use clap::Args;
use meterbar_store::RefreshCoordinator;
use std::io::{Write, stdout};
use tokio::time::{Duration, interval};
use tracing::info;

use crate::output::{DisplayMode, JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Shortest accepted refresh interval.
const MIN_INTERVAL_SECS: u64 = 10;

/// Arguments for the watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Refresh interval in seconds.
    #[arg(long, short, default_value = "60")]
    pub interval: u64,

    /// Status text: session percent, weekly quota left, or both.
    #[arg(long, value_enum, default_value_t = DisplayMode::Percent)]
    pub display: DisplayMode,

    /// Show used instead of remaining percentage.
    #[arg(long)]
    pub show_used: bool,
}

/// Runs the watch command. Ctrl+C stops running CLI commands and exits.
pub async fn run(coordinator: &RefreshCoordinator, args: &WatchArgs, cli: &Cli) -> Result<ExitCode> {
    let providers = super::selected(coordinator, cli.provider.as_deref()).await?;
    let refresh_interval = args.interval.max(MIN_INTERVAL_SECS);
    info!(interval = refresh_interval, providers = ?providers, "Starting watch mode");

    let formatter = TextFormatter::new(!cli.no_color);
    let mut ticker = interval(Duration::from_secs(refresh_interval));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                coordinator.reset_sessions();
                return Ok(ExitCode::Success);
            }
        }

        let outcomes = tokio::select! {
            outcomes = coordinator.refresh_all(&providers) => outcomes,
            _ = tokio::signal::ctrl_c() => {
                coordinator.reset_sessions();
                return Ok(ExitCode::Success);
            }
        };

        if cli.format == OutputFormat::Json {
            // One line per cycle.
            println!("{}", JsonFormatter::new(false).format_outcomes(&outcomes)?);
            continue;
        }

        print!("\x1b[2J\x1b[H");
        stdout().flush()?;

        println!(
            "{} - {} (refresh: {refresh_interval}s)",
            formatter.bold("meterbar watch"),
            Local::now().format("%H:%M:%S"),
        );
        println!("{}", "─".repeat(50));
        println!();

        let rows: Vec<_> = outcomes
            .iter()
            .map(|o| (coordinator.registry().descriptor(o.provider), o))
            .collect();
        println!("{}", formatter.format_summary(&rows, args.display, args.show_used));

        let now = Utc::now();
        for outcome in &outcomes {
            if let Some(summary) = coordinator.weekly_summary(outcome.provider, now).await {
                println!("{:<12} {summary}", outcome.provider.display_name());
            }
        }

        println!();
        println!("Press Ctrl+C to exit");
    }
}
