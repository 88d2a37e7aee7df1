//! Fetch error types.

use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for strategy and pipeline operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The strategy's credential is missing. Recorded as an unavailable
    /// attempt, not a failure.
    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// The strategy ran and failed for a reason not covered below.
    #[error("Strategy failed: {0}")]
    StrategyFailed(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Strategy exceeded its timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Rate limited by the provider.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after: Option<u64>,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Response could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core validation error.
    #[error("Core error: {0}")]
    Core(#[from] meterbar_core::CoreError),

    /// Keychain error.
    #[error("Keychain error: {0}")]
    Keychain(#[from] KeychainError),

    /// Process error.
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Every strategy was unavailable or failed.
    #[error("All strategies exhausted{}", exhausted_suffix(.last_error))]
    AllStrategiesExhausted {
        /// The last error any strategy reported.
        last_error: Option<String>,
    },
}

impl FetchError {
    /// Returns true if this error means "try the next strategy, this one
    /// never really ran".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::CredentialUnavailable(_))
            || matches!(self, Self::Process(ProcessError::NotFound(_)))
    }

    /// Maps an HTTP status to the matching error, or `None` for 2xx.
    pub fn from_status(status: u16, retry_after: Option<u64>, body: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(Self::AuthenticationFailed(format!("HTTP {status}"))),
            429 => Some(Self::RateLimited { retry_after }),
            _ => {
                let snippet: String = body.chars().take(120).collect();
                Some(Self::StrategyFailed(format!("HTTP {status}: {snippet}")))
            }
        }
    }
}

fn exhausted_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_deref()
        .map(|e| format!(": {e}"))
        .unwrap_or_default()
}

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Client could not be constructed.
    #[error("Client setup failed: {0}")]
    Setup(String),
}

// ============================================================================
// Keychain Error
// ============================================================================

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Access denied.
    #[error("Access denied to keychain")]
    AccessDenied,

    /// Keychain unavailable.
    #[error("Keychain unavailable: {0}")]
    Unavailable(String),

    /// Platform error.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Generic error.
    #[error("Keychain error: {0}")]
    Other(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::Ambiguous(_) => {
                KeychainError::Other("Ambiguous credential entry".to_string())
            }
            keyring::Error::PlatformFailure(e) => KeychainError::Platform(e.to_string()),
            keyring::Error::NoStorageAccess(_) => KeychainError::AccessDenied,
            _ => KeychainError::Other(err.to_string()),
        }
    }
}

// ============================================================================
// Process Error
// ============================================================================

/// Error type for process operations.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Command not found.
    #[error("Command not found: {0}")]
    NotFound(String),

    /// Command timed out.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// Command was killed by a session reset.
    #[error("Command cancelled by session reset")]
    Cancelled,

    /// Non-zero exit code.
    #[error("Command exited with code {code}: {stderr}")]
    NonZeroExit {
        /// Exit code from the process.
        code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
