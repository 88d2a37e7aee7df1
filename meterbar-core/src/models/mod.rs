//! Domain models for meterbar.
//!
//! ## Submodules
//!
//! - [`provider`] - Provider identity, metadata and capability flags
//! - [`credential`] - Credential source selection
//! - [`usage`] - Usage snapshots and rate windows
//! - [`cost`] - Token cost snapshots
//! - [`status`] - How data was fetched

mod cost;
mod credential;
mod provider;
mod status;
mod usage;

pub use cost::{DailyUsageEntry, TokenSnapshot};
pub use credential::{CredentialSource, TokenAccount};
pub use provider::{LoginMethod, ProviderIdentity, ProviderKind, ProviderMetadata};
pub use status::FetchSource;
pub use usage::{RateWindow, UsageSnapshot};
#[cfg(test)]
mod serde_tests;
