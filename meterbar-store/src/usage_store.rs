//! Per-provider usage state.
//!
//! Holds the latest snapshot, the last error, attempt history and snapshot
//! timestamps. A failed refresh never replaces a snapshot; it only records
//! the error next to it. Subscribers are notified through a `watch`
//! version counter.

use chrono::{DateTime, Utc};
use meterbar_core::{ProviderKind, UsageSnapshot};
use meterbar_fetch::FetchAttempt;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::settings_store::DEFAULT_HISTORY_LIMIT;

// ============================================================================
// Inner State
// ============================================================================

#[derive(Default)]
struct UsageStoreInner {
    snapshots: HashMap<ProviderKind, UsageSnapshot>,
    errors: HashMap<ProviderKind, String>,
    /// Most recent first.
    attempts: HashMap<ProviderKind, VecDeque<FetchAttempt>>,
    snapshot_times: HashMap<ProviderKind, DateTime<Utc>>,
}

// ============================================================================
// Usage Store
// ============================================================================

/// State store for provider usage data.
pub struct UsageStore {
    inner: RwLock<UsageStoreInner>,
    history_limit: usize,
    notify: watch::Sender<u64>,
}

impl Default for UsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageStore {
    /// Creates a store keeping the default attempt history.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Creates a store keeping at most `limit` attempts per provider.
    pub fn with_history_limit(limit: usize) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: RwLock::new(UsageStoreInner::default()),
            history_limit: limit.max(1),
            notify,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Latest snapshot for a provider.
    pub async fn snapshot(&self, provider: ProviderKind) -> Option<UsageSnapshot> {
        self.inner.read().await.snapshots.get(&provider).cloned()
    }

    /// All snapshots.
    pub async fn snapshots(&self) -> HashMap<ProviderKind, UsageSnapshot> {
        self.inner.read().await.snapshots.clone()
    }

    /// Error from the most recent refresh, cleared by the next success.
    pub async fn error(&self, provider: ProviderKind) -> Option<String> {
        self.inner.read().await.errors.get(&provider).cloned()
    }

    /// Attempt history, most recent first.
    pub async fn attempts(&self, provider: ProviderKind) -> Vec<FetchAttempt> {
        self.inner
            .read()
            .await
            .attempts
            .get(&provider)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// When the current snapshot was stored.
    pub async fn snapshot_time(&self, provider: ProviderKind) -> Option<DateTime<Utc>> {
        self.inner.read().await.snapshot_times.get(&provider).copied()
    }

    /// Returns true if there is no snapshot or it is older than `threshold`.
    pub async fn is_stale(&self, provider: ProviderKind, threshold: Duration) -> bool {
        match self.snapshot_time(provider).await {
            Some(time) => {
                let age = Utc::now().signed_duration_since(time);
                age > chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX)
            }
            None => true,
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Stores a successful refresh.
    pub async fn record_success(
        &self,
        provider: ProviderKind,
        snapshot: UsageSnapshot,
        attempts: Vec<FetchAttempt>,
    ) {
        {
            let mut inner = self.inner.write().await;
            inner.snapshot_times.insert(provider, snapshot.updated_at);
            inner.snapshots.insert(provider, snapshot);
            inner.errors.remove(&provider);
            Self::push_attempts(&mut inner, provider, attempts, self.history_limit);
        }
        debug!(provider = %provider, "Snapshot updated");
        self.bump();
    }

    /// Stores a failed refresh. The previous snapshot is kept.
    pub async fn record_failure(
        &self,
        provider: ProviderKind,
        error: String,
        attempts: Vec<FetchAttempt>,
    ) {
        {
            let mut inner = self.inner.write().await;
            inner.errors.insert(provider, error);
            Self::push_attempts(&mut inner, provider, attempts, self.history_limit);
        }
        warn!(provider = %provider, "Refresh failed, keeping previous snapshot");
        self.bump();
    }

    /// Forgets everything about a provider.
    pub async fn clear(&self, provider: ProviderKind) {
        {
            let mut inner = self.inner.write().await;
            inner.snapshots.remove(&provider);
            inner.errors.remove(&provider);
            inner.attempts.remove(&provider);
            inner.snapshot_times.remove(&provider);
        }
        self.bump();
    }

    fn push_attempts(
        inner: &mut UsageStoreInner,
        provider: ProviderKind,
        attempts: Vec<FetchAttempt>,
        limit: usize,
    ) {
        let history = inner.attempts.entry(provider).or_default();
        // A pipeline reports in call order; the history is newest first.
        for attempt in attempts {
            history.push_front(attempt);
        }
        history.truncate(limit);
    }

    // ========================================================================
    // Observable
    // ========================================================================

    /// Subscribes to store changes; the value is a version counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn bump(&self) {
        self.notify.send_modify(|v| *v += 1);
    }
}

// ============================================================================
// Tests
// ============================================================================
