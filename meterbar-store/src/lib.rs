// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Meterbar Store
//!
//! State and refresh coordination for meterbar.
//!
//! - **[`RefreshCoordinator`]**: single-flight refreshes, stale-while-revalidate
//!   reads, token cost scans and session resets
//! - **[`UsageStore`]**: latest snapshot, last error and attempt history per provider
//! - **[`TokenCache`]**: token cost snapshots with an in-flight flag
//! - **[`SettingsStore`]**: user preferences persisted as JSON
//!
//! ## Usage
//!
//! ```ignore
//! use meterbar_store::{RefreshCoordinator, SettingsStore};
//! use meterbar_core::ProviderKind;
//!
//! let settings = Arc::new(SettingsStore::load_default().await?);
//! let coordinator = RefreshCoordinator::from_settings(settings, ctx).await;
//!
//! let outcome = coordinator.refresh(ProviderKind::Claude).await;
//! let view = coordinator.read(ProviderKind::Codex).await;
//! ```

pub mod coordinator;
pub mod cost_scanner;
pub mod error;
pub mod persistence;
pub mod settings_store;
pub mod token_cache;
pub mod usage_store;

pub use coordinator::{COST_CACHE_TTL, COST_RETRY_BACKOFF, ProviderView, RefreshCoordinator, RefreshOutcome};
pub use cost_scanner::{SCAN_DAYS, scan_logs};
pub use error::StoreError;
pub use persistence::{
    default_cache_dir, default_config_dir, default_cost_cache_path, default_settings_path,
    load_json, load_json_or_default, remove_file_if_exists, save_json,
};
pub use settings_store::{
    DEFAULT_COST_SCAN_TIMEOUT, DEFAULT_HISTORY_LIMIT, LogLevel, ProviderSettings, RefreshCadence,
    Settings, SettingsStore,
};
pub use token_cache::TokenCache;
pub use usage_store::UsageStore;
