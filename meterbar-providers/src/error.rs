//! Provider lookup errors.

use thiserror::Error;

/// Errors from resolving user-supplied provider names.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No descriptor matches the name or alias.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}
