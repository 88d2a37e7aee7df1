//! CLI command implementations.

pub mod attempts;
pub mod cache;
pub mod cost;
pub mod pace;
pub mod providers;
pub mod usage;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use meterbar_core::ProviderKind;
use meterbar_fetch::FetchContext;
use meterbar_providers::ProviderRegistry;
use meterbar_store::{RefreshCoordinator, SettingsStore};

/// Builds the coordinator from the settings file and the system
/// collaborators (keychain, process runner, HTTP client, cookie cache).
///
/// The HTTP client only talks to hosts of registered endpoints.
pub async fn build_coordinator() -> Result<RefreshCoordinator> {
    let settings = SettingsStore::load_default()
        .await
        .context("failed to load settings")?;
    let endpoints = ProviderRegistry::new().endpoint_urls();
    let ctx = FetchContext::system(&endpoints).context("failed to build HTTP client")?;
    Ok(RefreshCoordinator::from_settings(Arc::new(settings), ctx).await)
}

/// Resolves the `--provider` argument.
///
/// `None` and `"enabled"` select the enabled providers (or the registry
/// defaults when none are enabled), `"all"` selects every provider, and
/// anything else is a comma-separated list of CLI names or aliases.
pub fn select_providers(
    registry: &ProviderRegistry,
    arg: Option<&str>,
    enabled: Vec<ProviderKind>,
) -> Result<Vec<ProviderKind>> {
    let arg = arg.map(str::trim).map(str::to_lowercase);
    let selected = match arg.as_deref() {
        None | Some("" | "enabled") => {
            if enabled.is_empty() {
                registry.default_enabled()
            } else {
                enabled
            }
        }
        Some("all") => registry.kinds(),
        Some(names) => {
            let mut providers = Vec::new();
            for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let id = registry.resolve(name)?.id;
                if !providers.contains(&id) {
                    providers.push(id);
                }
            }
            if providers.is_empty() {
                anyhow::bail!("No valid providers specified");
            }
            providers
        }
    };
    Ok(selected)
}

/// Providers selected by the global `--provider` flag.
pub async fn selected(coordinator: &RefreshCoordinator, arg: Option<&str>) -> Result<Vec<ProviderKind>> {
    let enabled = coordinator.settings().enabled_providers().await;
    select_providers(coordinator.registry(), arg, enabled)
}

// ============================================================================
// Tests
// ============================================================================
