//! Token cost tracking types.
//!
//! - [`TokenSnapshot`] - Local 30-day token/cost aggregate for a provider
//! - [`DailyUsageEntry`] - Per-day usage breakdown

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Token Snapshot
// ============================================================================

/// Token cost snapshot from local log scanning.
///
/// A failed scan keeps the totals of the last successful one and sets
/// `error`. With no earlier scan the snapshot has `error` and no totals, so
/// readers can tell "never scanned" apart from "scan failed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSnapshot {
    /// When this snapshot was produced.
    pub updated_at: DateTime<Utc>,
    /// Cost in USD for the last 30 days.
    pub last_30_days_cost_usd: Option<f64>,
    /// Tokens used in the last 30 days.
    pub last_30_days_tokens: Option<u64>,
    /// Daily usage entries, oldest first.
    #[serde(default)]
    pub daily: Vec<DailyUsageEntry>,
    /// Failure of the latest scan. Totals, when present, are older.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenSnapshot {
    /// Creates an empty snapshot stamped now.
    pub fn new() -> Self {
        Self {
            updated_at: Utc::now(),
            last_30_days_cost_usd: None,
            last_30_days_tokens: None,
            daily: Vec::new(),
            error: None,
        }
    }

    /// Creates a snapshot recording a failed scan.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new()
        }
    }

    /// Builds a snapshot from daily entries, computing the 30-day totals.
    pub fn from_daily(mut daily: Vec<DailyUsageEntry>) -> Self {
        daily.sort_by(|a, b| a.date.cmp(&b.date));
        let tokens: u64 = daily.iter().map(DailyUsageEntry::computed_total_tokens).sum();
        let cost: Option<f64> = daily
            .iter()
            .filter_map(|d| d.cost_usd)
            .fold(None, |acc, c| Some(acc.unwrap_or(0.0) + c));
        Self {
            last_30_days_cost_usd: cost,
            last_30_days_tokens: Some(tokens),
            daily,
            ..Self::new()
        }
    }

    /// Returns true if the scan failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the average daily cost over days with data.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_daily_cost(&self) -> Option<f64> {
        if self.daily.is_empty() {
            return None;
        }
        let total: f64 = self.daily.iter().filter_map(|d| d.cost_usd).sum();
        Some(total / self.daily.len() as f64)
    }
}

impl Default for TokenSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Daily Usage Entry
// ============================================================================

/// Daily usage entry for token/cost tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageEntry {
    /// Date in "YYYY-MM-DD" format.
    pub date: String,
    /// Input tokens used.
    pub input_tokens: Option<u64>,
    /// Output tokens generated.
    pub output_tokens: Option<u64>,
    /// Cache read tokens.
    pub cache_read_tokens: Option<u64>,
    /// Cache creation tokens.
    pub cache_creation_tokens: Option<u64>,
    /// Total tokens, when reported directly.
    pub total_tokens: Option<u64>,
    /// Total cost in USD.
    pub cost_usd: Option<f64>,
    /// Models seen on this day.
    #[serde(default)]
    pub models_used: Vec<String>,
}

impl DailyUsageEntry {
    /// Creates a new entry for the given date.
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            input_tokens: None,
            output_tokens: None,
            cache_read_tokens: None,
            cache_creation_tokens: None,
            total_tokens: None,
            cost_usd: None,
            models_used: Vec::new(),
        }
    }

    /// Total tokens, computed from the components when not set.
    pub fn computed_total_tokens(&self) -> u64 {
        if let Some(total) = self.total_tokens {
            return total;
        }
        self.input_tokens.unwrap_or(0)
            + self.output_tokens.unwrap_or(0)
            + self.cache_read_tokens.unwrap_or(0)
            + self.cache_creation_tokens.unwrap_or(0)
    }
}

// ============================================================================
// Tests
// ============================================================================
