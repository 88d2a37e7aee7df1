//! Secure credential storage using the system keychain.
//!
//! - macOS: Keychain Services
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KDE Wallet)
//!
//! ## Prompts and caching
//!
//! A keychain read can pop an OS permission dialog. Reads go through a
//! single async gate so at most one prompt is on screen at a time, and
//! every answer (including "no entry") is cached per `SystemKeychain`
//! instance so the user is asked once per process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, trace, warn};

use crate::error::KeychainError;

// ============================================================================
// Credential Store Trait
// ============================================================================

/// Read-only access to stored secrets.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Reads a secret.
    ///
    /// # Returns
    /// * `Ok(Some(secret))` - Secret found
    /// * `Ok(None)` - No entry
    /// * `Err(e)` - The store could not be read
    async fn read_secret(&self, service: &str, account: &str)
    -> Result<Option<String>, KeychainError>;

    /// Drops any cached answers.
    fn clear_cache(&self) {}
}

// ============================================================================
// System Keychain Implementation
// ============================================================================

/// Credential store backed by the `keyring` crate.
#[derive(Debug, Default)]
pub struct SystemKeychain {
    prompt_gate: tokio::sync::Mutex<()>,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl SystemKeychain {
    /// Creates a new system keychain instance with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_key(service: &str, account: &str) -> String {
        format!("{service}:{account}")
    }

    fn cached(&self, key: &str) -> Option<Option<String>> {
        self.cache.lock().ok().and_then(|c| c.get(key).cloned())
    }

    fn read_blocking(service: &str, account: &str) -> Result<Option<String>, KeychainError> {
        let entry = Entry::new(service, account).map_err(|e| KeychainError::Platform(e.to_string()))?;
        match entry.get_password() {
            Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for SystemKeychain {
    async fn read_secret(
        &self,
        service: &str,
        account: &str,
    ) -> Result<Option<String>, KeychainError> {
        let key = Self::cache_key(service, account);
        if let Some(hit) = self.cached(&key) {
            trace!(service = %service, account = %account, hit = true, "Keychain cache lookup");
            return Ok(hit);
        }

        let _gate = self.prompt_gate.lock().await;
        // Another caller may have answered while we waited for the gate.
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }

        debug!(service = %service, account = %account, "Reading credential from keychain");
        let (svc, acct) = (service.to_string(), account.to_string());
        let result = tokio::task::spawn_blocking(move || Self::read_blocking(&svc, &acct))
            .await
            .map_err(|e| KeychainError::Other(e.to_string()))?;

        match result {
            Ok(secret) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, secret.clone());
                }
                Ok(secret)
            }
            Err(e) => {
                warn!(service = %service, account = %account, error = %e, "Failed to read credential");
                Err(e)
            }
        }
    }

    fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
            debug!("Cleared keychain cache");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key() {
        assert_eq!(SystemKeychain::cache_key("meterbar", "zai"), "meterbar:zai");
    }

    #[tokio::test]
    async fn test_cached_answer_skips_keychain() {
        let keychain = SystemKeychain::new();
        keychain
            .cache
            .lock()
            .unwrap()
            .insert(SystemKeychain::cache_key("svc", "acct"), Some("s3cret".into()));

        let secret = keychain.read_secret("svc", "acct").await.unwrap();
        assert_eq!(secret.as_deref(), Some("s3cret"));

        keychain.clear_cache();
        assert!(keychain.cached("svc:acct").is_none());
    }
}
