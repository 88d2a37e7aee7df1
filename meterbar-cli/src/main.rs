// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! meterbar - AI coding assistant quota monitoring from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Usage for the enabled providers (Codex + Claude by default)
//! meterbar
//!
//! # A single provider, or several
//! meterbar --provider codex
//! meterbar --provider codex,claude
//!
//! # Weekly pace and the attempt log
//! meterbar pace
//! meterbar attempts --provider claude
//!
//! # JSON output
//! meterbar --format json --pretty
//!
//! # Token cost from local session logs
//! meterbar cost --refresh
//!
//! # Watch mode
//! meterbar watch --interval 60
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use commands::{attempts, cache, cost, pace, providers, usage, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// meterbar - quota monitoring for AI coding assistants.
#[derive(Parser)]
#[command(name = "meterbar")]
#[command(about = "Quota and pace monitoring for AI coding assistants")]
#[command(long_about = r#"
meterbar reports how much of each AI coding assistant's rate-limited quota
is used, whether the weekly burn rate will last until reset, and how many
tokens local session logs account for.

Supported providers:
  • Codex (codex)
  • Claude (claude)
  • Cursor (cursor)
  • Copilot (copilot)
  • Gemini (gemini)
  • Factory / Droid (factory)
  • z.ai (zai)
  • Augment (augment)
  • Kiro (kiro)
  • MiniMax (minimax)

Examples:
  meterbar                       # Enabled providers
  meterbar --provider all        # Every provider
  meterbar pace                  # Weekly pace
  meterbar cost --refresh        # Rescan local token usage
"#)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. Defaults to `usage`.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format.
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Providers to query: a name, a comma-separated list, "all" or
    /// "enabled".
    #[arg(long, short, global = true)]
    pub provider: Option<String>,

    /// Verbose output (debug logging).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no logging, no error text).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch current usage (default if no command specified).
    #[command(visible_alias = "u")]
    Usage(usage::UsageArgs),

    /// Show the weekly pace of providers that support it.
    Pace,

    /// Refresh and show the fetch attempt log.
    Attempts,

    /// Show local token usage and cost.
    #[command(visible_alias = "c")]
    Cost(cost::CostArgs),

    /// Delete cached token cost data.
    ClearCache,

    /// List available providers.
    #[command(visible_alias = "p")]
    Providers,

    /// Refresh on an interval until interrupted.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// No provider produced data.
    NoData = 2,
}

impl ExitCode {
    /// `Success` if anything produced data, `NoData` otherwise.
    pub fn from_data(has_data: bool) -> Self {
        if has_data { Self::Success } else { Self::NoData }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("meterbar=debug,info")
    } else {
        EnvFilter::new("meterbar=warn")
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the flags.
fn setup_logging(verbose: bool, quiet: bool) -> Option<FilterHandle> {
    if quiet {
        return None;
    }

    let from_env = std::env::var("RUST_LOG").is_ok();
    let filter = if from_env {
        EnvFilter::from_default_env()
    } else {
        default_filter(verbose)
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    // Only the settings file may still lower or raise the default.
    (!from_env && !verbose).then_some(handle)
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let handle = setup_logging(cli.verbose, cli.quiet);

    let code = match run(&cli, handle).await {
        Ok(code) => code,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::Error
        }
    };

    std::process::exit(code as i32);
}

async fn run(cli: &Cli, handle: Option<FilterHandle>) -> Result<ExitCode> {
    if let Some(Commands::Providers) = &cli.command {
        return providers::run(cli);
    }

    let coordinator = commands::build_coordinator().await?;

    if let Some(handle) = handle {
        let level = coordinator.settings().get().await.log_level;
        if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(format!("meterbar={level}"))) {
            tracing::debug!(error = %e, "Could not apply configured log level");
        }
    }

    match &cli.command {
        Some(Commands::Usage(args)) => usage::run(&coordinator, args, cli).await,
        Some(Commands::Pace) => pace::run(&coordinator, cli).await,
        Some(Commands::Attempts) => attempts::run(&coordinator, cli).await,
        Some(Commands::Cost(args)) => cost::run(&coordinator, args, cli).await,
        Some(Commands::ClearCache) => cache::clear(&coordinator, cli).await,
        Some(Commands::Watch(args)) => watch::run(&coordinator, args, cli).await,
        Some(Commands::Providers) => providers::run(cli),
        None => usage::run(&coordinator, &usage::UsageArgs::default(), cli).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_subcommands() {
        let cli = Cli::try_parse_from(["meterbar", "clear-cache"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ClearCache)));

        assert!(Cli::try_parse_from(["meterbar", "reset-sessions"]).is_err());
    }

    #[test]
    fn test_watch_display_flags() {
        let cli = Cli::try_parse_from(["meterbar", "watch", "--display", "both", "--show-used"]).unwrap();
        let Some(Commands::Watch(args)) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.display, output::DisplayMode::Both);
        assert!(args.show_used);
        assert_eq!(args.interval, 60);
    }
}
