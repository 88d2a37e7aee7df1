//! Core error types for `meterbar`.

use thiserror::Error;

/// Core error type for model validation and configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown provider name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data from a provider response.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
