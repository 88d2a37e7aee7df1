//! Shared parsing helpers for provider responses.
//!
//! JSON helpers map decode failures to [`FetchError::InvalidResponse`] so a
//! malformed body is recorded as a failed attempt. The text helpers scrape
//! the human-oriented output of CLI tools.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use meterbar_core::{LoginMethod, ProviderIdentity, ProviderKind, RateWindow, UsageSnapshot};
use meterbar_fetch::FetchError;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::warn;

// ============================================================================
// JSON
// ============================================================================

/// Decodes a JSON body, labelling failures with `what`.
pub(crate) fn json<T: DeserializeOwned>(body: &str, what: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, what, "Failed to decode response");
        FetchError::InvalidResponse(format!("invalid {what}: {e}"))
    })
}

/// Parses RFC 3339 timestamps, bare dates, and unix seconds.
pub(crate) fn timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    raw.parse::<i64>().ok().and_then(unix_seconds)
}

/// Converts unix seconds, rejecting out-of-range values.
pub(crate) fn unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Percentage of `limit` consumed by `used`; `None` for a non-positive limit.
pub(crate) fn percent_of(used: f64, limit: f64) -> Option<f64> {
    (limit > 0.0 && used.is_finite()).then(|| used / limit * 100.0)
}

/// Builds a window from a used/limit pair with an optional reset timestamp.
pub(crate) fn count_window(used: f64, limit: f64, resets_at: Option<&str>) -> Option<RateWindow> {
    let mut window = RateWindow::new(percent_of(used, limit)?);
    window.resets_at = resets_at.and_then(timestamp);
    Some(window)
}

/// Identity for `kind`, or `None` when nothing identifying was reported.
pub(crate) fn identity(
    kind: ProviderKind,
    email: Option<String>,
    plan: Option<String>,
    login_method: LoginMethod,
) -> Option<ProviderIdentity> {
    if email.is_none() && plan.is_none() {
        return None;
    }
    let mut identity = ProviderIdentity::new(kind);
    identity.account_email = email;
    identity.plan_name = plan;
    identity.login_method = Some(login_method);
    Some(identity)
}

// ============================================================================
// Counter responses
// ============================================================================

/// The used/limit counter shape shared by several dashboard APIs.
///
/// Every field is optional; each provider picks the pairs it reports.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Counters {
    pub tokens_used: Option<f64>,
    pub token_limit: Option<f64>,
    pub credits_used: Option<f64>,
    pub credit_limit: Option<f64>,
    #[serde(alias = "requestsMade")]
    pub requests_used: Option<f64>,
    pub request_limit: Option<f64>,
    pub completions_used: Option<f64>,
    pub completion_limit: Option<f64>,
    pub period_start: Option<String>,
    #[serde(alias = "periodEnd", alias = "resetsAt")]
    pub reset_at: Option<String>,
    pub plan: Option<String>,
    pub email: Option<String>,
}

impl Counters {
    /// Window for a used/limit pair, stamped with the period bounds.
    pub fn window(&self, used: Option<f64>, limit: Option<f64>) -> Option<RateWindow> {
        let mut window = count_window(used?, limit?, self.reset_at.as_deref())?;
        window.window_start = self.period_start.as_deref().and_then(timestamp);
        Some(window)
    }

    /// Token window.
    pub fn tokens(&self) -> Option<RateWindow> {
        self.window(self.tokens_used, self.token_limit)
    }

    /// Credit window.
    pub fn credits(&self) -> Option<RateWindow> {
        self.window(self.credits_used, self.credit_limit)
    }

    /// Request window.
    pub fn requests(&self) -> Option<RateWindow> {
        self.window(self.requests_used, self.request_limit)
    }

    /// Completion window.
    pub fn completions(&self) -> Option<RateWindow> {
        self.window(self.completions_used, self.completion_limit)
    }
}

// ============================================================================
// CLI text
// ============================================================================

/// "Session: 23% left" / "Current week (all models): 45% used (resets Fri 9am)"
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?P<label>[a-z0-9][a-z0-9 ()]*?)\s*(?:limit)?\s*:\s*(?P<pct>\d+(?:\.\d+)?)%\s*(?P<dir>left|used|remaining)(?:\s*\((?:resets\s+)?(?P<reset>[^)]+)\))?",
    )
    .expect("Invalid regex")
});

/// "Credits: 500/1000" or "Credits: $12.50 / 50"
static CREDITS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)credits\s*:\s*\$?(\d+(?:\.\d+)?)\s*/\s*\$?(\d+(?:\.\d+)?)")
        .expect("Invalid regex")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:account|email)\s*:\s*([^\s]+@[^\s]+)").expect("Invalid regex")
});

static PLAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)plan\s*:\s*([\w .+-]+?)\s*$").expect("Invalid regex")
});

/// One labelled percentage line from CLI output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextWindow {
    pub label: String,
    pub used_percent: f64,
    pub reset_description: Option<String>,
}

/// Extracts every labelled percentage line, converting "left" to used.
pub(crate) fn percent_lines(text: &str) -> Vec<TextWindow> {
    PERCENT_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let pct: f64 = caps.name("pct")?.as_str().parse().ok()?;
            let used = match caps.name("dir")?.as_str().to_ascii_lowercase().as_str() {
                "used" => pct,
                _ => 100.0 - pct,
            };
            Some(TextWindow {
                label: caps.name("label")?.as_str().trim().to_ascii_lowercase(),
                used_percent: used,
                reset_description: caps.name("reset").map(|m| m.as_str().trim().to_string()),
            })
        })
        .collect()
}

/// Maps labelled lines onto a snapshot: weekly lines go to `secondary`,
/// model-specific lines to `tertiary`, anything else to `primary`.
pub(crate) fn snapshot_from_text(text: &str) -> UsageSnapshot {
    let mut snapshot = UsageSnapshot::new();
    for line in percent_lines(text) {
        let mut window = RateWindow::new(line.used_percent);
        window.reset_description = line.reset_description;

        let slot = if line.label.contains("opus") || line.label.contains("sonnet") {
            &mut snapshot.tertiary
        } else if line.label.contains("week") {
            window.window_minutes = Some(meterbar_core::DEFAULT_WEEKLY_WINDOW_MINUTES);
            &mut snapshot.secondary
        } else {
            if line.label.contains("session") || line.label.contains("5h") {
                window.window_minutes = Some(300);
            }
            &mut snapshot.primary
        };
        if slot.is_none() {
            *slot = Some(window);
        }
    }
    snapshot
}

/// `(used, limit)` from a "Credits: used/limit" line.
pub(crate) fn credits(text: &str) -> Option<(f64, f64)> {
    let caps = CREDITS_RE.captures(text)?;
    Some((caps.get(1)?.as_str().parse().ok()?, caps.get(2)?.as_str().parse().ok()?))
}

/// Account email from an "Account:" or "Email:" line.
pub(crate) fn email(text: &str) -> Option<String> {
    EMAIL_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Plan name from a "Plan:" line.
pub(crate) fn plan(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| PLAN_RE.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_formats() {
        assert!(timestamp("2025-01-05T00:00:00Z").is_some());
        assert!(timestamp("2025-01-05T00:00:00.123+02:00").is_some());
        assert_eq!(
            timestamp("2025-02-01"),
            Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(timestamp("1736035200"), unix_seconds(1_736_035_200));
        assert!(timestamp("").is_none());
        assert!(timestamp("tomorrow").is_none());
    }

    #[test]
    fn test_percent_of_rejects_zero_limit() {
        assert_eq!(percent_of(25.0, 100.0), Some(25.0));
        assert_eq!(percent_of(5.0, 0.0), None);
        assert_eq!(percent_of(f64::NAN, 10.0), None);
    }

    #[test]
    fn test_percent_lines_left_and_used() {
        let text = "Session: 77% left (resets 3pm)\nWeekly limit: 40% used\n";
        let lines = percent_lines(text);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].label, "session");
        assert!((lines[0].used_percent - 23.0).abs() < f64::EPSILON);
        assert_eq!(lines[0].reset_description.as_deref(), Some("3pm"));
        assert_eq!(lines[1].label, "weekly");
        assert!((lines[1].used_percent - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_from_text_slots() {
        let text = "\
Current session: 12% used (resets 5pm)
Current week (all models): 48% used (resets Oct 20)
Current week (Opus): 5% used
";
        let snapshot = snapshot_from_text(text);
        assert!((snapshot.primary.as_ref().unwrap().used_percent - 12.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.primary.as_ref().unwrap().window_minutes, Some(300));
        let weekly = snapshot.secondary.unwrap();
        assert!((weekly.used_percent - 48.0).abs() < f64::EPSILON);
        assert_eq!(weekly.reset_description.as_deref(), Some("Oct 20"));
        assert!((snapshot.tertiary.unwrap().used_percent - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_from_text_no_matches() {
        let snapshot = snapshot_from_text("Welcome to the CLI\n");
        assert!(!snapshot.has_data());
    }

    #[test]
    fn test_credits_email_plan() {
        let text = "Account: dev@example.com\nPlan: Pro\nCredits: 500/1000\n";
        assert_eq!(credits(text), Some((500.0, 1000.0)));
        assert_eq!(email(text).as_deref(), Some("dev@example.com"));
        assert_eq!(plan(text).as_deref(), Some("Pro"));
    }

    #[test]
    fn test_identity_requires_something() {
        assert!(identity(ProviderKind::Zai, None, None, LoginMethod::ApiKey).is_none());
        let id = identity(
            ProviderKind::Zai,
            None,
            Some("Lite".to_string()),
            LoginMethod::ApiKey,
        )
        .unwrap();
        assert_eq!(id.provider_id, ProviderKind::Zai);
    }
}
