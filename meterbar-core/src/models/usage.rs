//! Usage-related types.
//!
//! - [`UsageSnapshot`] - Latest usage for a provider, up to three windows
//! - [`RateWindow`] - A single time-bounded quota window

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderIdentity;
use super::status::FetchSource;
use crate::error::CoreError;

// ============================================================================
// Usage Snapshot
// ============================================================================

/// A snapshot of usage data with primary, secondary, and tertiary windows.
///
/// - **Primary** = session window (e.g., 5 hours for Claude)
/// - **Secondary** = weekly/monthly window
/// - **Tertiary** = premium tier window, when reported
///
/// Snapshots are replaced wholesale by the next successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Primary usage window (session-based).
    pub primary: Option<RateWindow>,
    /// Secondary usage window (weekly/monthly).
    pub secondary: Option<RateWindow>,
    /// Tertiary usage window (premium tier).
    pub tertiary: Option<RateWindow>,
    /// When this snapshot was fetched.
    pub updated_at: DateTime<Utc>,
    /// Account identity for this provider.
    pub identity: Option<ProviderIdentity>,
    /// How this data was fetched.
    #[serde(default)]
    pub fetch_source: FetchSource,
}

impl UsageSnapshot {
    /// Creates a new empty usage snapshot.
    pub fn new() -> Self {
        Self {
            primary: None,
            secondary: None,
            tertiary: None,
            updated_at: Utc::now(),
            identity: None,
            fetch_source: FetchSource::default(),
        }
    }

    /// Returns true if this snapshot is older than `threshold`.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        Utc::now() - self.updated_at > threshold
    }

    /// Returns the highest usage percentage across all windows.
    pub fn max_usage_percent(&self) -> f64 {
        self.windows()
            .map(|w| w.used_percent)
            .fold(0.0_f64, f64::max)
    }

    /// Returns true if any window data is present.
    pub fn has_data(&self) -> bool {
        self.primary.is_some() || self.secondary.is_some() || self.tertiary.is_some()
    }

    /// Iterates over the present windows in primary, secondary, tertiary order.
    pub fn windows(&self) -> impl Iterator<Item = &RateWindow> {
        [&self.primary, &self.secondary, &self.tertiary]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    /// The window pace is computed on: the secondary (weekly) window.
    pub fn pace_window(&self) -> Option<&RateWindow> {
        self.secondary.as_ref()
    }

    /// Validates the snapshot data.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if any window has a percentage
    /// outside [0, 100], a non-finite value, or a start after its end.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, window) in [
            ("primary", &self.primary),
            ("secondary", &self.secondary),
            ("tertiary", &self.tertiary),
        ] {
            if let Some(window) = window {
                window
                    .validate()
                    .map_err(|e| CoreError::InvalidData(format!("{name} window: {e}")))?;
            }
        }
        Ok(())
    }

    /// Clamps every window to valid ranges instead of rejecting.
    pub fn sanitize(&mut self) {
        for window in [&mut self.primary, &mut self.secondary, &mut self.tertiary]
            .into_iter()
            .flatten()
        {
            window.sanitize();
        }
    }
}

impl Default for UsageSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Rate Window
// ============================================================================

/// A time-bounded quota allocation.
///
/// `remaining_percent` is derived from `used_percent`, so
/// `used + remaining == 100` holds for every sanitized window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Percentage of quota used (0-100).
    pub used_percent: f64,
    /// Window duration in minutes (300 = 5 hours, 10080 = 1 week).
    pub window_minutes: Option<u32>,
    /// When this window started, if the provider reports it.
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
    /// When this window resets (the window end).
    pub resets_at: Option<DateTime<Utc>>,
    /// Human-readable reset description (e.g., "in 2 hours").
    pub reset_description: Option<String>,
}

impl RateWindow {
    /// Creates a new window with the given used percentage.
    pub fn new(used_percent: f64) -> Self {
        Self {
            used_percent,
            window_minutes: None,
            window_start: None,
            resets_at: None,
            reset_description: None,
        }
    }

    /// Creates a window from a used/limit pair (request or credit counts).
    ///
    /// A zero limit yields 0% used.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(used: u64, limit: u64) -> Self {
        let pct = if limit == 0 {
            0.0
        } else {
            (used as f64 / limit as f64) * 100.0
        };
        let mut window = Self::new(pct);
        window.sanitize();
        window
    }

    /// Sets the window length.
    #[must_use]
    pub fn with_window_minutes(mut self, minutes: u32) -> Self {
        self.window_minutes = Some(minutes);
        self
    }

    /// Sets the reset time.
    #[must_use]
    pub fn with_resets_at(mut self, resets_at: DateTime<Utc>) -> Self {
        self.resets_at = Some(resets_at);
        self
    }

    /// Sets the window start.
    #[must_use]
    pub fn with_window_start(mut self, start: DateTime<Utc>) -> Self {
        self.window_start = Some(start);
        self
    }

    /// Returns the remaining percentage (100 - used), clamped to [0, 100].
    pub fn remaining_percent(&self) -> f64 {
        if !self.used_percent.is_finite() {
            return 100.0;
        }
        (100.0 - self.used_percent).clamp(0.0, 100.0)
    }

    /// Returns true if usage is at or over the limit.
    pub fn is_exhausted(&self) -> bool {
        self.remaining_percent() <= 0.0
    }

    /// Returns the window duration.
    pub fn window_duration(&self) -> Option<Duration> {
        self.window_minutes.map(|m| Duration::minutes(i64::from(m)))
    }

    /// Returns the window bounds, deriving the start from the length when
    /// the provider only reports a reset time.
    pub fn bounds(&self, default_minutes: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.resets_at?;
        let start = self.window_start.unwrap_or_else(|| {
            let minutes = self.window_minutes.unwrap_or(default_minutes);
            end - Duration::minutes(i64::from(minutes))
        });
        Some((start, end))
    }

    /// Validates the window data.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidData` if `used_percent` is negative,
    /// greater than 100, not finite, or the start is after the end.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.used_percent.is_finite() {
            return Err(CoreError::InvalidData(
                "used_percent is not a finite number".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.used_percent) {
            return Err(CoreError::InvalidData(format!(
                "used_percent {} out of valid range [0, 100]",
                self.used_percent
            )));
        }
        if let (Some(start), Some(end)) = (self.window_start, self.resets_at) {
            if start > end {
                return Err(CoreError::InvalidData(format!(
                    "window starts at {start} after it ends at {end}"
                )));
            }
        }
        Ok(())
    }

    /// Clamps `used_percent` to [0, 100], replacing NaN/Infinity with 0.
    pub fn sanitize(&mut self) {
        if !self.used_percent.is_finite() {
            self.used_percent = 0.0;
        }
        self.used_percent = self.used_percent.clamp(0.0, 100.0);
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
