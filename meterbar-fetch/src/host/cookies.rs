//! Cached cookie headers for web strategies.
//!
//! Cookies are never read out of browser profiles here. They arrive either
//! as a manually configured header or from this cache, a JSON file keyed
//! by provider that an external importer keeps up to date.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meterbar_core::ProviderKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File name of the cookie cache inside the cache directory.
pub const COOKIE_CACHE_FILE: &str = "cookies.json";

/// A cookie header with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCookie {
    /// Full `Cookie` header value.
    pub cookie: String,
    /// Where it came from (e.g. "Chrome", "manual").
    pub source_label: String,
    /// When it was stored.
    pub stored_at: DateTime<Utc>,
}

/// Read access to cached cookie headers.
#[async_trait]
pub trait CookieCache: Send + Sync {
    /// Returns the cached header for a provider, if any.
    async fn load(&self, provider: ProviderKind) -> Option<CachedCookie>;
}

/// `CookieCache` backed by a JSON map of provider to cookie.
#[derive(Debug, Clone)]
pub struct JsonCookieCache {
    path: PathBuf,
}

impl JsonCookieCache {
    /// Cache at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache at `<cache_dir>/meterbar/cookies.json`.
    pub fn default_location() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("meterbar").join(COOKIE_CACHE_FILE))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CookieCache for JsonCookieCache {
    async fn load(&self, provider: ProviderKind) -> Option<CachedCookie> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read cookie cache");
                return None;
            }
        };

        let mut entries: HashMap<ProviderKind, CachedCookie> = match serde_json::from_str(&content)
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cookie cache is not valid JSON");
                return None;
            }
        };

        let entry = entries.remove(&provider).filter(|c| !c.cookie.trim().is_empty());
        debug!(provider = %provider, found = entry.is_some(), "Cookie cache lookup");
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = JsonCookieCache::new(dir.path().join("none.json"));
        assert!(cache.load(ProviderKind::Cursor).await.is_none());
    }

    #[tokio::test]
    async fn test_load_by_provider() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(COOKIE_CACHE_FILE);
        std::fs::write(
            &path,
            r#"{"cursor":{"cookie":"WorkosCursorSessionToken=abc","source_label":"Chrome","stored_at":"2024-05-01T10:00:00Z"},
               "factory":{"cookie":"  ","source_label":"Safari","stored_at":"2024-05-01T10:00:00Z"}}"#,
        )
        .unwrap();

        let cache = JsonCookieCache::new(&path);
        let cookie = cache.load(ProviderKind::Cursor).await.unwrap();
        assert_eq!(cookie.source_label, "Chrome");
        assert!(cache.load(ProviderKind::Factory).await.is_none());
        assert!(cache.load(ProviderKind::Claude).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(COOKIE_CACHE_FILE);
        std::fs::write(&path, "not json").unwrap();
        assert!(JsonCookieCache::new(&path).load(ProviderKind::Cursor).await.is_none());
    }
}
