// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `meterbar` Fetch
//!
//! Strategy pipeline and host collaborators.
//!
//! ## Host collaborators
//!
//! The [`host`] module defines the narrow interfaces strategies use to
//! reach the outside world, each with a system implementation:
//!
//! - [`host::keychain`] - Secret lookup (system keychain)
//! - [`host::process`] - Subprocess execution for CLI tools
//! - [`host::http`] - HTTP client with domain allowlist and retries
//! - [`host::cookies`] - Cached cookie headers
//!
//! ## Fetch Pipeline
//!
//! - [`strategy::FetchStrategy`] - One way of fetching a provider's usage
//! - [`pipeline::FetchPipeline`] - Runs strategies in declared order
//! - [`pipeline::FetchAttempt`] - One record per strategy invocation
//! - [`context::FetchContext`] - Collaborators plus per-provider settings
//!
//! ```ignore
//! use meterbar_fetch::{FetchContext, FetchPipeline};
//!
//! let ctx = FetchContext::system(&["https://api.anthropic.com/api/oauth/usage"])?;
//! let pipeline = FetchPipeline::with_strategies(strategies);
//! let outcome = pipeline.execute(&ctx).await;
//! for attempt in &outcome.attempts {
//!     println!("{}", attempt.diagnostic_line());
//! }
//! ```

pub mod context;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod retry;
pub mod strategy;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Errors
pub use error::{FetchError, HttpError, KeychainError, ProcessError};

// Host collaborators
pub use host::{
    CachedCookie, CliRunner, CookieCache, CredentialStore, HttpApi, HttpClient, HttpMethod,
    HttpRequest, HttpResponse, JsonCookieCache, ProcessOutput, ProcessRunner, SystemKeychain,
};

// Strategy & Pipeline
pub use context::{FetchContext, FetchContextBuilder, FetchSettings, SourceMode};
pub use pipeline::{FetchAttempt, FetchOutcome, FetchPipeline};
pub use retry::RetryStrategy;
pub use strategy::{DEFAULT_STRATEGY_TIMEOUT, FetchKind, FetchResult, FetchStrategy};
