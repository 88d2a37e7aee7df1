//! Providers command - list registered providers.

use anyhow::Result;
use meterbar_providers::ProviderRegistry;
use tracing::info;

use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Runs the providers command.
pub fn run(cli: &Cli) -> Result<ExitCode> {
    info!("Listing providers");

    let registry = ProviderRegistry::new();
    let providers = registry.all();

    match cli.format {
        OutputFormat::Text => {
            let formatter = TextFormatter::new(!cli.no_color);

            println!("{}", formatter.bold(&formatter.format_providers_header()));
            println!("{}", "─".repeat(70));
            for desc in providers {
                println!("{}", formatter.format_provider_line(desc));
            }
            println!();
            println!(
                "Total: {} providers ({} enabled by default)",
                providers.len(),
                registry.default_enabled().len()
            );
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::new(cli.pretty).format_providers(providers)?);
        }
    }

    Ok(ExitCode::Success)
}
