// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `meterbar` Core
//!
//! Core types for the `meterbar` usage monitor.
//!
//! This crate holds the domain model shared by every other crate. It does
//! no I/O.
//!
//! ## Key Types
//!
//! ### Provider Types
//! - [`ProviderKind`] - Enum of all supported providers
//! - [`ProviderIdentity`] - Account identity (siloed per provider)
//! - [`ProviderMetadata`] - Display info and capability flags
//! - [`CredentialSource`] - Which credential a refresh may use
//! - [`TokenAccount`] - A stored cookie header or token for one account
//!
//! ### Usage Types
//! - [`UsageSnapshot`] - Latest usage with up to three rate windows
//! - [`RateWindow`] - A time-bounded quota allocation
//! - [`TokenSnapshot`] - Cached token cost result
//!
//! ### Pace
//! - [`UsagePace`] - Burn rate relative to a linear schedule
//! - [`PacePolicy`] - Tunable thresholds and the weekly pace rules
//! - [`WeeklyDetail`] - Display labels derived from a pace

pub mod error;
pub mod models;
pub mod pace;

pub use error::CoreError;

pub use models::{
    // Provider types
    CredentialSource,
    TokenAccount,
    LoginMethod,
    ProviderIdentity,
    ProviderKind,
    ProviderMetadata,
    // Usage types
    RateWindow,
    UsageSnapshot,
    // Token cost
    DailyUsageEntry,
    TokenSnapshot,
    // Fetch
    FetchSource,
};

pub use pace::{
    DEFAULT_WEEKLY_WINDOW_MINUTES, PacePolicy, PaceStage, PaceThresholds, UsagePace, WeeklyDetail,
    format_countdown,
};
