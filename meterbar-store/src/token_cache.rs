//! Token cost cache.
//!
//! One entry per provider plus an in-flight claim guarding the scan. A claim
//! carries a generation number so only its owner can release it. Every
//! critical section is a few map operations; no lock is held across an
//! `.await`.

use chrono::{DateTime, Utc};
use meterbar_core::{ProviderKind, TokenSnapshot};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct Inner {
    entries: HashMap<ProviderKind, TokenSnapshot>,
    in_flight: HashMap<ProviderKind, u64>,
    next_claim: u64,
    last_attempt: HashMap<ProviderKind, DateTime<Utc>>,
}

/// Per-provider token cost snapshots.
#[derive(Default)]
pub struct TokenCache {
    inner: Mutex<Inner>,
}

impl TokenCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached snapshot, fresh or not.
    pub fn get(&self, provider: ProviderKind) -> Option<TokenSnapshot> {
        self.lock().entries.get(&provider).cloned()
    }

    /// Stores a snapshot. Later calls overwrite earlier ones, including a
    /// result that lands after an `invalidate`.
    pub fn put(&self, provider: ProviderKind, snapshot: TokenSnapshot) {
        self.lock().entries.insert(provider, snapshot);
        debug!(provider = %provider, "Token snapshot cached");
    }

    /// Records a failed scan and returns what the cache now holds.
    ///
    /// Totals from the last successful scan are kept, with `error` attached
    /// and `updated_at` unchanged. With nothing cached, a failure snapshot is
    /// stored instead.
    pub fn record_failure(&self, provider: ProviderKind, error: String) -> TokenSnapshot {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .entry(provider)
            .and_modify(|snapshot| snapshot.error = Some(error.clone()))
            .or_insert_with(|| TokenSnapshot::failed(error));
        entry.clone()
    }

    /// Drops the entry. Safe while a scan is in flight.
    pub fn invalidate(&self, provider: ProviderKind) {
        self.lock().entries.remove(&provider);
    }

    /// Returns true if the entry is missing or older than `ttl`.
    pub fn is_stale(&self, provider: ProviderKind, ttl: Duration) -> bool {
        let Some(updated_at) = self.lock().entries.get(&provider).map(|s| s.updated_at) else {
            return true;
        };
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Utc::now().signed_duration_since(updated_at) > ttl
    }

    /// Returns true while a scan for `provider` is running.
    pub fn is_in_flight(&self, provider: ProviderKind) -> bool {
        self.lock().in_flight.contains_key(&provider)
    }

    /// Claims the in-flight slot. Returns the claim's generation, or `None`
    /// if another scan holds it.
    pub fn begin_refresh(&self, provider: ProviderKind) -> Option<u64> {
        let mut inner = self.lock();
        if inner.in_flight.contains_key(&provider) {
            return None;
        }
        inner.next_claim += 1;
        let claim = inner.next_claim;
        inner.in_flight.insert(provider, claim);
        Some(claim)
    }

    /// Records the attempt time and releases the slot if `claim` still owns
    /// it. A claim dropped by `clear_in_flight` releases nothing.
    pub fn finish_refresh(&self, provider: ProviderKind, claim: u64) {
        let mut inner = self.lock();
        if inner.in_flight.get(&provider) == Some(&claim) {
            inner.in_flight.remove(&provider);
        }
        inner.last_attempt.insert(provider, Utc::now());
    }

    /// When a scan for `provider` last finished.
    pub fn last_attempt_at(&self, provider: ProviderKind) -> Option<DateTime<Utc>> {
        self.lock().last_attempt.get(&provider).copied()
    }

    /// Drops every entry and attempt time. In-flight flags stay with their
    /// owners.
    pub fn clear_all(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.last_attempt.clear();
    }

    /// Releases every in-flight claim. Scans still running finish without
    /// touching the claims taken after this.
    pub fn clear_in_flight(&self) {
        self.lock().in_flight.clear();
    }

    /// Copy of every cached snapshot, for persisting.
    pub fn snapshots(&self) -> HashMap<ProviderKind, TokenSnapshot> {
        self.lock().entries.clone()
    }

    /// Seeds entries loaded from disk without overwriting newer ones.
    pub fn restore(&self, snapshots: HashMap<ProviderKind, TokenSnapshot>) {
        let mut inner = self.lock();
        for (provider, snapshot) in snapshots {
            inner.entries.entry(provider).or_insert(snapshot);
        }
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TokenCache")
            .field("entries", &inner.entries.len())
            .field("in_flight", &inner.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tokens: u64) -> TokenSnapshot {
        TokenSnapshot {
            last_30_days_tokens: Some(tokens),
            ..TokenSnapshot::new()
        }
    }

    #[test]
    fn test_put_get_invalidate() {
        let cache = TokenCache::new();
        assert!(cache.get(ProviderKind::Claude).is_none());

        cache.put(ProviderKind::Claude, snapshot(10));
        assert_eq!(cache.get(ProviderKind::Claude).unwrap().last_30_days_tokens, Some(10));

        cache.invalidate(ProviderKind::Claude);
        assert!(cache.get(ProviderKind::Claude).is_none());
    }

    #[test]
    fn test_in_flight_claim_is_exclusive() {
        let cache = TokenCache::new();
        let claim = cache.begin_refresh(ProviderKind::Codex).unwrap();
        assert!(cache.begin_refresh(ProviderKind::Codex).is_none());
        assert!(cache.is_in_flight(ProviderKind::Codex));
        assert!(cache.last_attempt_at(ProviderKind::Codex).is_none());

        cache.finish_refresh(ProviderKind::Codex, claim);
        assert!(!cache.is_in_flight(ProviderKind::Codex));
        assert!(cache.last_attempt_at(ProviderKind::Codex).is_some());
        assert!(cache.begin_refresh(ProviderKind::Codex).is_some());
    }

    #[test]
    fn test_released_claim_cannot_free_newer_claim() {
        let cache = TokenCache::new();
        let first = cache.begin_refresh(ProviderKind::Claude).unwrap();
        cache.clear_in_flight();
        let second = cache.begin_refresh(ProviderKind::Claude).unwrap();
        assert_ne!(first, second);

        cache.finish_refresh(ProviderKind::Claude, first);
        assert!(cache.is_in_flight(ProviderKind::Claude));
        assert!(cache.begin_refresh(ProviderKind::Claude).is_none());

        cache.finish_refresh(ProviderKind::Claude, second);
        assert!(!cache.is_in_flight(ProviderKind::Claude));
    }

    #[test]
    fn test_failure_keeps_prior_totals() {
        let cache = TokenCache::new();
        let good = snapshot(42);
        let updated_at = good.updated_at;
        cache.put(ProviderKind::Claude, good);

        let kept = cache.record_failure(ProviderKind::Claude, "scan timed out".into());
        assert_eq!(kept.last_30_days_tokens, Some(42));
        assert_eq!(kept.updated_at, updated_at);
        assert_eq!(kept.error.as_deref(), Some("scan timed out"));
        assert_eq!(cache.get(ProviderKind::Claude).unwrap(), kept);

        let empty = cache.record_failure(ProviderKind::Codex, "unreadable".into());
        assert!(empty.last_30_days_tokens.is_none());
        assert!(empty.is_error());
    }

    #[test]
    fn test_invalidate_during_flight_keeps_late_result() {
        let cache = TokenCache::new();
        cache.put(ProviderKind::Claude, snapshot(1));
        let claim = cache.begin_refresh(ProviderKind::Claude).unwrap();

        cache.invalidate(ProviderKind::Claude);
        assert!(cache.is_in_flight(ProviderKind::Claude));

        cache.put(ProviderKind::Claude, snapshot(2));
        cache.finish_refresh(ProviderKind::Claude, claim);
        assert_eq!(cache.get(ProviderKind::Claude).unwrap().last_30_days_tokens, Some(2));
    }

    #[test]
    fn test_staleness() {
        let cache = TokenCache::new();
        assert!(cache.is_stale(ProviderKind::Codex, Duration::from_secs(60)));
        cache.put(ProviderKind::Codex, snapshot(1));
        assert!(!cache.is_stale(ProviderKind::Codex, Duration::from_secs(60)));
    }

    #[test]
    fn test_clear_all() {
        let cache = TokenCache::new();
        cache.put(ProviderKind::Codex, snapshot(1));
        let claim = cache.begin_refresh(ProviderKind::Codex).unwrap();
        cache.finish_refresh(ProviderKind::Codex, claim);

        cache.clear_all();
        assert!(cache.get(ProviderKind::Codex).is_none());
        assert!(cache.last_attempt_at(ProviderKind::Codex).is_none());
    }
}
