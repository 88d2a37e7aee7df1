//! Refresh coordination.
//!
//! The coordinator is the only writer of [`UsageStore`] and [`TokenCache`].
//! It guarantees at most one pipeline run per provider: a refresh requested
//! while another is running joins it and receives the same outcome. Runs are
//! spawned, so a run completes and frees its slot even when every caller
//! stops waiting.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use meterbar_core::{
    ProviderKind, TokenSnapshot, UsagePace, UsageSnapshot, WeeklyDetail,
};
use meterbar_fetch::{FetchAttempt, FetchContext};
use meterbar_providers::ProviderRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cost_scanner::scan_logs;
use crate::error::StoreError;
use crate::persistence::{default_cost_cache_path, load_json_or_default, remove_file_if_exists, save_json};
use crate::settings_store::SettingsStore;
use crate::token_cache::TokenCache;
use crate::usage_store::UsageStore;

/// Token cost snapshots younger than this are served without rescanning.
pub const COST_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A stale token snapshot is not rescanned in the background sooner than
/// this after the last attempt.
pub const COST_RETRY_BACKOFF: Duration = Duration::from_secs(5 * 60);

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// A running refresh, tagged so a finished run never evicts its successor.
type InFlight = HashMap<ProviderKind, (u64, SharedRefresh)>;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one pipeline run, shared by every caller that joined it.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Provider refreshed.
    pub provider: ProviderKind,
    /// The new snapshot, on success.
    pub snapshot: Option<UsageSnapshot>,
    /// Strategy that produced the snapshot.
    pub strategy_id: Option<String>,
    /// Surfaced error, on failure.
    pub error: Option<String>,
    /// Attempts of this run, in call order.
    pub attempts: Vec<FetchAttempt>,
}

impl RefreshOutcome {
    /// Returns true if the run produced a snapshot.
    pub fn is_success(&self) -> bool {
        self.snapshot.is_some()
    }

    fn failed(provider: ProviderKind, error: String) -> Self {
        Self {
            provider,
            snapshot: None,
            strategy_id: None,
            error: Some(error),
            attempts: Vec::new(),
        }
    }
}

/// What a reader sees without waiting on the network.
#[derive(Debug, Clone)]
pub struct ProviderView {
    /// Provider read.
    pub provider: ProviderKind,
    /// Cached snapshot, possibly stale.
    pub snapshot: Option<UsageSnapshot>,
    /// Error from the last refresh.
    pub error: Option<String>,
    /// True when the snapshot is missing or older than the cadence.
    pub is_stale: bool,
    /// True when a refresh is running (including one this read started).
    pub refreshing: bool,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Owns refreshes for every provider.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    registry: Arc<ProviderRegistry>,
    usage: Arc<UsageStore>,
    tokens: Arc<TokenCache>,
    settings: Arc<SettingsStore>,
    ctx: FetchContext,
    in_flight: Arc<Mutex<InFlight>>,
    next_run: Arc<AtomicU64>,
    cost_cache_path: PathBuf,
    log_dirs: HashMap<ProviderKind, PathBuf>,
}

impl RefreshCoordinator {
    /// Creates a coordinator over existing stores.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        usage: Arc<UsageStore>,
        tokens: Arc<TokenCache>,
        settings: Arc<SettingsStore>,
        ctx: FetchContext,
    ) -> Self {
        Self {
            registry,
            usage,
            tokens,
            settings,
            ctx,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_run: Arc::new(AtomicU64::new(0)),
            cost_cache_path: default_cost_cache_path(),
            log_dirs: HashMap::new(),
        }
    }

    /// Creates a coordinator with fresh stores sized from `settings`.
    pub async fn from_settings(settings: Arc<SettingsStore>, ctx: FetchContext) -> Self {
        let history_limit = settings.get().await.history_limit;
        Self::new(
            Arc::new(ProviderRegistry::new()),
            Arc::new(UsageStore::with_history_limit(history_limit)),
            Arc::new(TokenCache::new()),
            settings,
            ctx,
        )
    }

    /// Keeps the token cost cache at `path` instead of the default.
    #[must_use]
    pub fn with_cost_cache_path(mut self, path: PathBuf) -> Self {
        self.cost_cache_path = path;
        self
    }

    /// Scans `dir` for `provider`'s token logs instead of its default log
    /// directory.
    #[must_use]
    pub fn with_log_directory(mut self, provider: ProviderKind, dir: PathBuf) -> Self {
        self.log_dirs.insert(provider, dir);
        self
    }

    /// The provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The usage store.
    pub fn usage(&self) -> &UsageStore {
        &self.usage
    }

    /// The settings store.
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    fn in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Usage refresh
    // ========================================================================

    /// Refreshes `provider`, joining a run already in flight.
    ///
    /// The run is spawned: dropping this future stops the wait, not the run.
    pub async fn refresh(&self, provider: ProviderKind) -> RefreshOutcome {
        let run = {
            let mut in_flight = self.in_flight();
            if let Some((_, run)) = in_flight.get(&provider) {
                debug!(provider = %provider, "Joining in-flight refresh");
                run.clone()
            } else {
                let id = self.next_run.fetch_add(1, Ordering::Relaxed);
                let this = self.clone();
                // The slot is inserted below while the lock is still held, so
                // the task cannot free it first.
                let task = tokio::spawn(async move {
                    let _slot = RunSlot {
                        in_flight: this.in_flight.clone(),
                        provider,
                        id,
                    };
                    this.run_pipeline(provider).await
                });
                let run = async move {
                    task.await.unwrap_or_else(|e| {
                        warn!(provider = %provider, error = %e, "Refresh task failed");
                        RefreshOutcome::failed(provider, StoreError::from(e).to_string())
                    })
                }
                .boxed()
                .shared();
                in_flight.insert(provider, (id, run.clone()));
                run
            }
        };
        run.await
    }

    /// Returns true while a refresh of `provider` is running.
    pub fn is_refreshing(&self, provider: ProviderKind) -> bool {
        self.in_flight().contains_key(&provider)
    }

    #[instrument(skip(self), fields(provider = %provider))]
    async fn run_pipeline(&self, provider: ProviderKind) -> RefreshOutcome {
        let fetch_settings = self.settings.get().await.fetch_settings(provider);
        let ctx = self.ctx.with_settings(fetch_settings);
        let outcome = self.registry.execute(provider, &ctx).await;

        match outcome.result {
            Ok(result) => {
                self.usage
                    .record_success(provider, result.snapshot.clone(), outcome.attempts.clone())
                    .await;
                RefreshOutcome {
                    provider,
                    snapshot: Some(result.snapshot),
                    strategy_id: Some(result.strategy_id),
                    error: None,
                    attempts: outcome.attempts,
                }
            }
            Err(error) => {
                let error = error.to_string();
                self.usage
                    .record_failure(provider, error.clone(), outcome.attempts.clone())
                    .await;
                RefreshOutcome {
                    provider,
                    snapshot: None,
                    strategy_id: None,
                    error: Some(error),
                    attempts: outcome.attempts,
                }
            }
        }
    }

    /// Returns the cached view immediately, starting a background refresh
    /// when the snapshot is missing or older than the provider's cadence.
    pub async fn read(&self, provider: ProviderKind) -> ProviderView {
        let cadence = self.registry.descriptor(provider).refresh_cadence;
        let is_stale = self.usage.is_stale(provider, cadence).await;

        if is_stale && !self.is_refreshing(provider) {
            debug!(provider = %provider, "Stale read, refreshing in background");
            let this = self.clone();
            tokio::spawn(async move {
                this.refresh(provider).await;
            });
        }

        ProviderView {
            provider,
            snapshot: self.usage.snapshot(provider).await,
            error: self.usage.error(provider).await,
            is_stale,
            refreshing: is_stale || self.is_refreshing(provider),
        }
    }

    /// Refreshes every provider in parallel. Outcomes follow input order.
    pub async fn refresh_all(&self, providers: &[ProviderKind]) -> Vec<RefreshOutcome> {
        info!(count = providers.len(), "Refreshing providers");
        let handles = providers.iter().map(|&provider| {
            let this = self.clone();
            tokio::spawn(async move { this.refresh(provider).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(providers)
            .map(|(joined, &provider)| {
                joined.unwrap_or_else(|e| {
                    warn!(provider = %provider, error = %e, "Refresh task failed");
                    RefreshOutcome::failed(provider, StoreError::from(e).to_string())
                })
            })
            .collect()
    }

    /// Attempt history for `provider`, most recent first.
    pub async fn fetch_attempts(&self, provider: ProviderKind) -> Vec<FetchAttempt> {
        self.usage.attempts(provider).await
    }

    /// Kills CLI strategies in flight and forgets every in-flight run.
    ///
    /// Callers waiting on a killed run still receive its (failed) outcome.
    pub fn reset_sessions(&self) {
        info!("Resetting CLI sessions");
        self.ctx.runner.reset_sessions();
        self.in_flight().clear();
        self.tokens.clear_in_flight();
    }

    // ========================================================================
    // Pace
    // ========================================================================

    /// Weekly pace of the cached snapshot's pace window.
    pub async fn weekly_pace(&self, provider: ProviderKind, now: DateTime<Utc>) -> Option<UsagePace> {
        let snapshot = self.usage.snapshot(provider).await?;
        let policy = self.settings.get().await.pace;
        self.registry
            .weekly_pace(provider, &policy, snapshot.pace_window()?, now)
    }

    /// Display labels for the weekly pace.
    pub async fn weekly_detail(
        &self,
        provider: ProviderKind,
        now: DateTime<Utc>,
    ) -> Option<WeeklyDetail> {
        let snapshot = self.usage.snapshot(provider).await?;
        let policy = self.settings.get().await.pace;
        policy.weekly_detail(
            &self.registry.descriptor(provider).metadata,
            snapshot.pace_window()?,
            now,
        )
    }

    /// One-line weekly pace summary.
    pub async fn weekly_summary(&self, provider: ProviderKind, now: DateTime<Utc>) -> Option<String> {
        let snapshot = self.usage.snapshot(provider).await?;
        let policy = self.settings.get().await.pace;
        policy.weekly_summary(
            &self.registry.descriptor(provider).metadata,
            snapshot.pace_window()?,
            now,
        )
    }

    // ========================================================================
    // Token cost
    // ========================================================================

    /// Loads the on-disk token cost cache into memory.
    pub async fn load_cost_cache(&self) {
        let cached: HashMap<ProviderKind, TokenSnapshot> =
            load_json_or_default(&self.cost_cache_path).await;
        debug!(entries = cached.len(), "Loaded cost cache");
        self.tokens.restore(cached);
    }

    /// Cached token snapshot.
    pub fn token_snapshot(&self, provider: ProviderKind) -> Option<TokenSnapshot> {
        self.tokens.get(provider)
    }

    /// Returns true while a token scan for `provider` runs.
    pub fn is_token_refresh_in_flight(&self, provider: ProviderKind) -> bool {
        self.tokens.is_in_flight(provider)
    }

    /// When a token scan for `provider` last finished.
    pub fn token_last_attempt_at(&self, provider: ProviderKind) -> Option<DateTime<Utc>> {
        self.tokens.last_attempt_at(provider)
    }

    /// Returns true if `provider`'s token snapshot is missing or older than
    /// [`COST_CACHE_TTL`].
    pub fn is_token_stale(&self, provider: ProviderKind) -> bool {
        self.tokens.is_stale(provider, COST_CACHE_TTL)
    }

    /// Token snapshot, rescanning first when `force` is set. Otherwise the
    /// same as [`read_token_snapshot`](Self::read_token_snapshot).
    pub async fn cost_snapshot(&self, provider: ProviderKind, force: bool) -> Option<TokenSnapshot> {
        if force {
            return self.refresh_token_snapshot(provider).await;
        }
        self.read_token_snapshot(provider).await
    }

    /// Returns the cached token snapshot immediately, starting a background
    /// scan when it is stale.
    ///
    /// Only a provider with nothing cached waits for a scan. A stale snapshot
    /// is not rescanned while a scan runs or within [`COST_RETRY_BACKOFF`] of
    /// the last attempt.
    pub async fn read_token_snapshot(&self, provider: ProviderKind) -> Option<TokenSnapshot> {
        if !self.registry.descriptor(provider).supports_token_cost() {
            return None;
        }
        let Some(cached) = self.tokens.get(provider) else {
            return self.refresh_token_snapshot(provider).await;
        };
        if self.is_token_stale(provider)
            && !self.tokens.is_in_flight(provider)
            && !self.token_attempted_within(provider, COST_RETRY_BACKOFF)
        {
            debug!(provider = %provider, "Stale token snapshot, scanning in background");
            let this = self.clone();
            tokio::spawn(async move {
                this.refresh_token_snapshot(provider).await;
            });
        }
        Some(cached)
    }

    fn token_attempted_within(&self, provider: ProviderKind, window: Duration) -> bool {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        self.tokens
            .last_attempt_at(provider)
            .is_some_and(|at| Utc::now().signed_duration_since(at) < window)
    }

    /// Scans `provider`'s local logs.
    ///
    /// Returns `None` for providers without token cost support. When a scan
    /// is already running the cached snapshot is returned instead. A failed
    /// or timed-out scan keeps the totals of the last good scan and attaches
    /// the error.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn refresh_token_snapshot(&self, provider: ProviderKind) -> Option<TokenSnapshot> {
        let descriptor = self.registry.descriptor(provider);
        if !descriptor.supports_token_cost() {
            return None;
        }
        let Some(claim) = self.tokens.begin_refresh(provider) else {
            debug!("Token scan already in flight");
            return self.tokens.get(provider);
        };
        let _guard = InFlightGuard {
            tokens: &self.tokens,
            provider,
            claim,
        };

        let log_dir = self
            .log_dirs
            .get(&provider)
            .cloned()
            .or_else(|| descriptor.token_cost.log_directory());
        let scanned = match log_dir {
            Some(dir) => {
                let timeout = self.settings.get().await.cost_scan_timeout();
                let scan = tokio::task::spawn_blocking(move || scan_logs(&dir, Utc::now()));
                match tokio::time::timeout(timeout, scan).await {
                    Ok(Ok(Ok(snapshot))) => Ok(snapshot),
                    Ok(Ok(Err(e))) => Err(e.to_string()),
                    Ok(Err(e)) => Err(StoreError::from(e).to_string()),
                    Err(_) => Err(StoreError::Timeout(format!("{provider} cost scan")).to_string()),
                }
            }
            None => Err("no log directory".to_string()),
        };

        let snapshot = match scanned {
            Ok(snapshot) => {
                self.tokens.put(provider, snapshot.clone());
                snapshot
            }
            Err(error) => {
                warn!(error = %error, "Token scan failed");
                self.tokens.record_failure(provider, error)
            }
        };
        if let Err(e) = save_json(&self.cost_cache_path, &self.tokens.snapshots()).await {
            warn!(error = %e, "Failed to persist cost cache");
        }
        Some(snapshot)
    }

    /// Clears token snapshots and deletes the on-disk cost cache.
    pub async fn clear_cost_usage_cache(&self) -> Option<StoreError> {
        self.tokens.clear_all();
        let result = remove_file_if_exists(&self.cost_cache_path).await;
        info!(ok = result.is_ok(), "Cleared cost usage cache");
        result.err()
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("registry", &self.registry)
            .field("cost_cache_path", &self.cost_cache_path)
            .finish_non_exhaustive()
    }
}

/// Frees a usage run's in-flight slot when the run ends or panics, unless a
/// newer run holds it.
struct RunSlot {
    in_flight: Arc<Mutex<InFlight>>,
    provider: ProviderKind,
    id: u64,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(&self.provider).is_some_and(|(run, _)| *run == self.id) {
            in_flight.remove(&self.provider);
        }
    }
}

/// Releases the token scan claim even if the scan is cancelled.
struct InFlightGuard<'a> {
    tokens: &'a TokenCache,
    provider: ProviderKind,
    claim: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tokens.finish_refresh(self.provider, self.claim);
    }
}

// ============================================================================
// Tests
// ============================================================================
