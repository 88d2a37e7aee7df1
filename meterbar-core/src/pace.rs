//! Usage pace: how fast a quota window is being consumed relative to a
//! linear schedule across the window.
//!
//! A pace compares the actual used percentage with the percentage a
//! perfectly even consumer would have used by now. A positive delta means
//! usage is *ahead* of schedule (burning quota too fast, a deficit); a
//! negative delta means usage is *behind* schedule (quota in reserve).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::{ProviderMetadata, RateWindow};

/// Window length assumed for weekly pace when a provider omits it.
pub const DEFAULT_WEEKLY_WINDOW_MINUTES: u32 = 10_080;

// ============================================================================
// Stage
// ============================================================================

/// Pace classification, ordered from most reserve to most deficit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaceStage {
    /// Far below the linear schedule.
    FarBehind,
    /// Clearly below the linear schedule.
    Behind,
    /// A little below the linear schedule.
    SlightlyBehind,
    /// Within the on-track band.
    OnTrack,
    /// A little above the linear schedule.
    SlightlyAhead,
    /// Clearly above the linear schedule.
    Ahead,
    /// Far above the linear schedule.
    FarAhead,
}

impl PaceStage {
    /// Returns a short label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FarBehind => "far behind",
            Self::Behind => "behind",
            Self::SlightlyBehind => "slightly behind",
            Self::OnTrack => "on track",
            Self::SlightlyAhead => "slightly ahead",
            Self::Ahead => "ahead",
            Self::FarAhead => "far ahead",
        }
    }

    /// True for the three stages above schedule.
    pub fn is_ahead(&self) -> bool {
        *self > Self::OnTrack
    }

    /// True for the three stages below schedule.
    pub fn is_behind(&self) -> bool {
        *self < Self::OnTrack
    }
}

impl std::fmt::Display for PaceStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Thresholds
// ============================================================================

/// Symmetric band edges (in percentage points of delta) between stages.
///
/// `|delta| <= on_track` is on track, `<= slight` is slightly ahead/behind,
/// `<= moderate` is ahead/behind, anything larger is far ahead/behind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceThresholds {
    /// Upper edge of the on-track band.
    pub on_track: f64,
    /// Upper edge of the slightly ahead/behind band.
    pub slight: f64,
    /// Upper edge of the ahead/behind band.
    pub moderate: f64,
}

impl Default for PaceThresholds {
    fn default() -> Self {
        Self {
            on_track: 2.0,
            slight: 6.0,
            moderate: 12.0,
        }
    }
}

impl PaceThresholds {
    /// Checks that the table is finite and strictly increasing from zero.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidConfig` for a non-monotonic table.
    pub fn validate(&self) -> Result<(), CoreError> {
        let values = [self.on_track, self.slight, self.moderate];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CoreError::InvalidConfig(
                "pace thresholds must be finite".to_string(),
            ));
        }
        if !(0.0 <= self.on_track && self.on_track < self.slight && self.slight < self.moderate) {
            return Err(CoreError::InvalidConfig(format!(
                "pace thresholds must satisfy 0 <= on_track < slight < moderate, got {} / {} / {}",
                self.on_track, self.slight, self.moderate
            )));
        }
        Ok(())
    }

    /// Classifies a delta (actual - expected).
    pub fn stage_for(&self, delta: f64) -> PaceStage {
        let magnitude = delta.abs();
        let ahead = delta > 0.0;
        if magnitude <= self.on_track {
            PaceStage::OnTrack
        } else if magnitude <= self.slight {
            if ahead { PaceStage::SlightlyAhead } else { PaceStage::SlightlyBehind }
        } else if magnitude <= self.moderate {
            if ahead { PaceStage::Ahead } else { PaceStage::Behind }
        } else if ahead {
            PaceStage::FarAhead
        } else {
            PaceStage::FarBehind
        }
    }
}

// ============================================================================
// Usage Pace
// ============================================================================

/// Burn rate of one window at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePace {
    /// Classified stage.
    pub stage: PaceStage,
    /// `actual - expected`, in percentage points.
    pub delta_percent: f64,
    /// Percentage a linear consumer would have used by now.
    pub expected_used_percent: f64,
    /// Percentage actually used.
    pub actual_used_percent: f64,
    /// True when the current burn rate does not exhaust the quota before reset.
    pub will_last_to_reset: bool,
    /// Seconds until the quota runs out at the current rate.
    ///
    /// `None` whenever `will_last_to_reset` is true.
    pub eta_seconds: Option<f64>,
}

impl UsagePace {
    /// Computes the pace of `window` at `now`.
    ///
    /// Returns `None` when the window has no reset time or a non-positive
    /// length. A missing start is derived as `resets_at - window_minutes`,
    /// with `default_window_minutes` standing in for a missing length.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(
        window: &RateWindow,
        now: DateTime<Utc>,
        default_window_minutes: u32,
        thresholds: &PaceThresholds,
    ) -> Option<Self> {
        let (start, end) = window.bounds(default_window_minutes)?;
        let total = (end - start).num_milliseconds() as f64 / 1000.0;
        if total <= 0.0 {
            return None;
        }

        let elapsed = ((now - start).num_milliseconds() as f64 / 1000.0).clamp(0.0, total);
        let expected = (elapsed / total * 100.0).clamp(0.0, 100.0);
        let actual = if window.used_percent.is_finite() {
            window.used_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let delta = actual - expected;

        let (will_last_to_reset, eta_seconds) = if actual <= 0.0 || elapsed <= 0.0 {
            (true, None)
        } else {
            let rate = actual / elapsed;
            let eta = ((100.0 - actual) / rate).max(0.0);
            if eta >= total - elapsed {
                (true, None)
            } else {
                (false, Some(eta))
            }
        };

        Some(Self {
            stage: thresholds.stage_for(delta),
            delta_percent: delta,
            expected_used_percent: expected,
            actual_used_percent: actual,
            will_last_to_reset,
            eta_seconds,
        })
    }
}

// ============================================================================
// Weekly Pace Policy
// ============================================================================

/// Display labels for a weekly pace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyDetail {
    /// "On pace", "N% in deficit" or "N% in reserve".
    pub left_label: String,
    /// "Lasts until reset", "Runs out in ..." or "Runs out now".
    pub right_label: Option<String>,
    /// Percentage a linear consumer would have used by now.
    pub expected_used_percent: f64,
    /// Classified stage.
    pub stage: PaceStage,
}

/// Rules deciding when a weekly pace is shown, and how it is classified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacePolicy {
    /// Stage band edges.
    pub thresholds: PaceThresholds,
    /// Below this expected percentage the window is too young to judge.
    pub minimum_expected_percent: f64,
}

impl Default for PacePolicy {
    fn default() -> Self {
        Self {
            thresholds: PaceThresholds::default(),
            minimum_expected_percent: 3.0,
        }
    }
}

impl PacePolicy {
    /// Validates the thresholds and the minimum.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidConfig` when either is out of range.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.thresholds.validate()?;
        if !(0.0..=100.0).contains(&self.minimum_expected_percent) {
            return Err(CoreError::InvalidConfig(format!(
                "minimum expected percent {} out of range [0, 100]",
                self.minimum_expected_percent
            )));
        }
        Ok(())
    }

    /// Weekly pace for a provider's window, or `None` when pace does not apply.
    pub fn weekly_pace(
        &self,
        provider: &ProviderMetadata,
        window: &RateWindow,
        now: DateTime<Utc>,
    ) -> Option<UsagePace> {
        if !provider.supports_pace || window.remaining_percent() <= 0.0 {
            return None;
        }
        let pace =
            UsagePace::compute(window, now, DEFAULT_WEEKLY_WINDOW_MINUTES, &self.thresholds)?;
        (pace.expected_used_percent >= self.minimum_expected_percent).then_some(pace)
    }

    /// Display labels for the weekly pace.
    pub fn weekly_detail(
        &self,
        provider: &ProviderMetadata,
        window: &RateWindow,
        now: DateTime<Utc>,
    ) -> Option<WeeklyDetail> {
        let pace = self.weekly_pace(provider, window, now)?;
        Some(WeeklyDetail {
            left_label: left_label(&pace),
            right_label: right_label(&pace),
            expected_used_percent: pace.expected_used_percent,
            stage: pace.stage,
        })
    }

    /// One-line summary, e.g. `"Pace: 8% in deficit · Runs out in 2d 4h"`.
    pub fn weekly_summary(
        &self,
        provider: &ProviderMetadata,
        window: &RateWindow,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let detail = self.weekly_detail(provider, window, now)?;
        Some(match detail.right_label {
            Some(right) => format!("Pace: {} · {right}", detail.left_label),
            None => format!("Pace: {}", detail.left_label),
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn left_label(pace: &UsagePace) -> String {
    let delta = pace.delta_percent.abs().round() as i64;
    if pace.stage.is_ahead() {
        format!("{delta}% in deficit")
    } else if pace.stage.is_behind() {
        format!("{delta}% in reserve")
    } else {
        "On pace".to_string()
    }
}

fn right_label(pace: &UsagePace) -> Option<String> {
    if pace.will_last_to_reset {
        return Some("Lasts until reset".to_string());
    }
    let countdown = format_countdown(pace.eta_seconds?);
    if countdown == "now" {
        Some("Runs out now".to_string())
    } else {
        Some(format!("Runs out in {countdown}"))
    }
}

/// Formats a duration in seconds as a compact countdown.
///
/// Under a minute is `"now"`, then `"42m"`, `"5h 12m"`, `"2d 4h"`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_countdown(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 60.0 {
        return "now".to_string();
    }
    let minutes = (seconds / 60.0).floor() as u64;
    let hours = minutes / 60;
    let days = hours / 24;
    if hours == 0 {
        format!("{minutes}m")
    } else if days == 0 {
        format!("{hours}h {}m", minutes % 60)
    } else {
        format!("{days}d {}h", hours % 24)
    }
}

// ============================================================================
// Tests
// ============================================================================
