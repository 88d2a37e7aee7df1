//! User preferences store.
//!
//! Settings live in `<config_dir>/meterbar/settings.json`. Unknown or
//! missing fields fall back to defaults so older files keep loading.

use meterbar_core::{CredentialSource, PacePolicy, ProviderKind, TokenAccount};
use meterbar_fetch::{FetchSettings, SourceMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{default_settings_path, load_json, save_json};

/// Attempts kept per provider unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Token cost scans slower than this are abandoned.
pub const DEFAULT_COST_SCAN_TIMEOUT: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Providers refreshed by `usage` and `watch` when none is named.
    pub enabled_providers: BTreeSet<ProviderKind>,

    /// Auto-refresh cadence.
    pub refresh_cadence: RefreshCadence,

    /// Log level used when neither `--verbose` nor `RUST_LOG` is given.
    pub log_level: LogLevel,

    /// Fetch attempts kept per provider.
    pub history_limit: usize,

    /// Pace thresholds and the minimum expected percentage.
    pub pace: PacePolicy,

    /// Token cost scan timeout in seconds.
    pub cost_scan_timeout_secs: u64,

    /// Per-provider settings.
    pub provider_settings: HashMap<ProviderKind, ProviderSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled_providers: [ProviderKind::Codex, ProviderKind::Claude].into_iter().collect(),
            refresh_cadence: RefreshCadence::default(),
            log_level: LogLevel::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            pace: PacePolicy::default(),
            cost_scan_timeout_secs: DEFAULT_COST_SCAN_TIMEOUT.as_secs(),
            provider_settings: HashMap::new(),
        }
    }
}

impl Settings {
    /// Checks values a hand-edited file could get wrong.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` for an invalid pace table or a zero
    /// history limit.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.pace.validate()?;
        if self.history_limit == 0 {
            return Err(StoreError::Config("history_limit must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Settings for one provider, defaulted when absent.
    pub fn provider(&self, kind: ProviderKind) -> ProviderSettings {
        self.provider_settings.get(&kind).cloned().unwrap_or_default()
    }

    /// The fetch settings a refresh of `kind` runs with.
    pub fn fetch_settings(&self, kind: ProviderKind) -> FetchSettings {
        self.provider(kind).to_fetch_settings()
    }

    /// Token cost scan timeout.
    pub fn cost_scan_timeout(&self) -> Duration {
        Duration::from_secs(self.cost_scan_timeout_secs.max(1))
    }
}

/// Auto-refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshCadence {
    /// Only refresh on demand.
    Manual,
    /// Every minute.
    OneMinute,
    /// Every two minutes.
    #[default]
    TwoMinutes,
    /// Every five minutes.
    FiveMinutes,
    /// Every fifteen minutes.
    FifteenMinutes,
}

impl RefreshCadence {
    /// The interval, or `None` for manual refresh.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            RefreshCadence::Manual => None,
            RefreshCadence::OneMinute => Some(Duration::from_secs(60)),
            RefreshCadence::TwoMinutes => Some(Duration::from_secs(120)),
            RefreshCadence::FiveMinutes => Some(Duration::from_secs(300)),
            RefreshCadence::FifteenMinutes => Some(Duration::from_secs(900)),
        }
    }
}

impl std::fmt::Display for RefreshCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshCadence::Manual => write!(f, "Manual"),
            RefreshCadence::OneMinute => write!(f, "1 minute"),
            RefreshCadence::TwoMinutes => write!(f, "2 minutes"),
            RefreshCadence::FiveMinutes => write!(f, "5 minutes"),
            RefreshCadence::FifteenMinutes => write!(f, "15 minutes"),
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Informational.
    Info,
    /// Debugging.
    Debug,
    /// Everything.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Strategy kinds allowed to run.
    pub source_mode: Option<SourceMode>,

    /// Credential the refresh may use.
    pub credential_source: Option<CredentialSource>,

    /// Manually supplied `Cookie` header.
    pub cookie_header: Option<String>,

    /// Environment variable holding an API key. Implies
    /// `CredentialSource::Environment` when no source is set.
    pub api_key_env: Option<String>,

    /// Per-strategy timeout override in seconds.
    pub timeout_secs: Option<u64>,

    /// Stored accounts, each refreshed on its own and merged.
    pub token_accounts: Vec<TokenAccount>,
}

impl ProviderSettings {
    /// Converts to the settings a pipeline runs with.
    pub fn to_fetch_settings(&self) -> FetchSettings {
        let credential_source = match (&self.credential_source, &self.api_key_env) {
            (Some(source), _) => source.clone(),
            (None, Some(key)) => CredentialSource::Environment(key.clone()),
            (None, None) => CredentialSource::Auto,
        };
        FetchSettings {
            source_mode: self.source_mode.unwrap_or_default(),
            credential_source,
            manual_cookie_header: self
                .cookie_header
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            timeout: self.timeout_secs.map(Duration::from_secs),
            token_accounts: self
                .token_accounts
                .iter()
                .filter(|a| !a.token.trim().is_empty())
                .cloned()
                .collect(),
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Shared settings with persistence and change notification.
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
    notify: watch::Sender<u64>,
}

impl SettingsStore {
    /// Creates a store holding defaults, saved to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self::with_settings(path, Settings::default())
    }

    /// Creates a store holding `settings`, saved to `path`.
    pub fn with_settings(path: PathBuf, settings: Settings) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
            notify,
        }
    }

    /// Loads from the default path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load_default() -> Result<Self, StoreError> {
        Self::load(default_settings_path()).await
    }

    /// Loads from `path`.
    ///
    /// A missing file yields defaults. A corrupt or invalid one is logged and
    /// replaced by defaults so a bad edit never blocks startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let settings = match load_json::<Settings>(&path).await {
            Ok(settings) => match settings.validate() {
                Ok(()) => {
                    info!(path = %path.display(), "Loaded settings");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid settings, using defaults");
                    Settings::default()
                }
            },
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Settings file not found, using defaults");
                Settings::default()
            }
            Err(StoreError::Serialization(e)) => {
                warn!(path = %path.display(), error = %e, "Corrupt settings, using defaults");
                Settings::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self::with_settings(path, settings))
    }

    /// Returns a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Applies `f` and notifies subscribers.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        {
            let mut settings = self.settings.write().await;
            f(&mut settings);
        }
        self.notify.send_modify(|v| *v += 1);
    }

    /// Writes the settings to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the write fails.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await.clone();
        settings.validate()?;
        save_json(&self.path, &settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Subscribes to changes; the value is a version counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    /// The file this store saves to.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    // ========================================================================
    // Convenience Methods
    // ========================================================================

    /// Returns true if `provider` is enabled.
    pub async fn is_provider_enabled(&self, provider: ProviderKind) -> bool {
        self.settings.read().await.enabled_providers.contains(&provider)
    }

    /// Enables or disables `provider`.
    pub async fn set_provider_enabled(&self, provider: ProviderKind, enabled: bool) {
        self.update(|s| {
            if enabled {
                s.enabled_providers.insert(provider);
            } else {
                s.enabled_providers.remove(&provider);
            }
        })
        .await;
    }

    /// Replaces the settings for one provider.
    pub async fn set_provider_settings(&self, provider: ProviderKind, settings: ProviderSettings) {
        self.update(|s| {
            s.provider_settings.insert(provider, settings);
        })
        .await;
    }

    /// Enabled providers in stable order.
    pub async fn enabled_providers(&self) -> Vec<ProviderKind> {
        self.settings.read().await.enabled_providers.iter().copied().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
