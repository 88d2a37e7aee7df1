// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `meterbar` Providers
//!
//! Provider descriptors for the `meterbar` usage monitor.
//!
//! Providers are data, not code paths: each descriptor carries metadata,
//! capability flags and an ordered list of [`StrategySpec`]s. The three
//! generic strategies ([`CliStrategy`], [`HttpStrategy`],
//! [`LocalFileStrategy`]) are instantiated from those specs and hand the
//! raw body to the provider's parser.
//!
//! Providers that accept stored token accounts are refreshed once per
//! account and the results merged (see [`accounts`]).
//!
//! ## Supported Providers
//!
//! | Provider | CLI | OAuth | API Key | Web Cookie | Pace |
//! |----------|-----|-------|---------|------------|------|
//! | Codex (`OpenAI`) | yes | yes | | | yes |
//! | Claude (Anthropic) | yes | yes | | manual | yes |
//! | Cursor | | | | manual | |
//! | Copilot (GitHub) | | yes | yes | | |
//! | Gemini (Google) | | yes | | | |
//! | Factory (Droid) | | yes | | manual | |
//! | z.ai | | | yes | | |
//! | Augment | | | | manual | |
//! | Kiro | yes | | | | |
//! | `MiniMax` | | | yes | manual | |
//!
//! ## Usage
//!
//! ```ignore
//! use meterbar_core::{CredentialSource, ProviderKind};
//! use meterbar_fetch::FetchContext;
//! use meterbar_providers::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! let ctx = FetchContext::system(&registry.endpoint_urls())?;
//! let snapshot = registry
//!     .run(ProviderKind::Claude, CredentialSource::Auto, &ctx)
//!     .await?;
//! ```

pub mod accounts;
pub mod descriptor;
pub mod error;
pub mod registry;
pub mod strategies;

mod parse;

// Provider modules (alphabetical)
pub mod augment;
pub mod claude;
pub mod codex;
pub mod copilot;
pub mod cursor;
pub mod factory;
pub mod gemini;
pub mod kiro;
pub mod minimax;
pub mod zai;

/// Keychain service under which meterbar stores its own secrets.
pub const KEYCHAIN_SERVICE: &str = "meterbar";

pub use accounts::merge_account_snapshots;
pub use descriptor::{
    AccountInjection, CliConfig, DEFAULT_REFRESH_CADENCE, FetchPlan, ProviderDescriptor, ProviderDescriptorBuilder,
    TokenCostConfig,
};
pub use error::ProviderError;
pub use registry::ProviderRegistry;
pub use strategies::{
    CliSpec, CliStrategy, HttpAuth, HttpSpec, HttpStrategy, LocalFileSpec, LocalFileStrategy,
    StrategySpec, TokenSource, UrlLookup, UsageParser,
};

// Re-export provider descriptors
pub use augment::augment_descriptor;
pub use claude::claude_descriptor;
pub use codex::codex_descriptor;
pub use copilot::copilot_descriptor;
pub use cursor::cursor_descriptor;
pub use factory::factory_descriptor;
pub use gemini::gemini_descriptor;
pub use kiro::kiro_descriptor;
pub use minimax::minimax_descriptor;
pub use zai::zai_descriptor;
