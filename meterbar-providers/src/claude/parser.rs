//! Claude response parsing.

use meterbar_core::{DEFAULT_WEEKLY_WINDOW_MINUTES, RateWindow, UsageSnapshot};
use meterbar_fetch::FetchError;
use serde::Deserialize;
use tracing::debug;

use crate::parse;

/// OAuth usage response. Each window reports `utilization` as percent used.
#[derive(Debug, Deserialize)]
struct ClaudeUsageResponse {
    five_hour: Option<ClaudeWindow>,
    seven_day: Option<ClaudeWindow>,
    seven_day_opus: Option<ClaudeWindow>,
    seven_day_sonnet: Option<ClaudeWindow>,
}

#[derive(Debug, Deserialize)]
struct ClaudeWindow {
    utilization: Option<f64>,
    resets_at: Option<String>,
}

impl ClaudeWindow {
    fn into_rate_window(self, minutes: u32) -> Option<RateWindow> {
        let mut window = RateWindow::new(self.utilization?).with_window_minutes(minutes);
        window.resets_at = self.resets_at.as_deref().and_then(parse::timestamp);
        Some(window)
    }
}

/// Parses the OAuth usage response.
///
/// The tertiary slot takes the Opus window when present, else Sonnet.
pub(crate) fn parse_claude_oauth_response(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: ClaudeUsageResponse = parse::json(body, "Claude usage response")?;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = response.five_hour.and_then(|w| w.into_rate_window(300));
    snapshot.secondary = response
        .seven_day
        .and_then(|w| w.into_rate_window(DEFAULT_WEEKLY_WINDOW_MINUTES));
    snapshot.tertiary = response
        .seven_day_opus
        .and_then(|w| w.into_rate_window(DEFAULT_WEEKLY_WINDOW_MINUTES))
        .or_else(|| {
            response
                .seven_day_sonnet
                .and_then(|w| w.into_rate_window(DEFAULT_WEEKLY_WINDOW_MINUTES))
        });

    debug!(
        session = ?snapshot.primary.as_ref().map(|w| w.used_percent),
        weekly = ?snapshot.secondary.as_ref().map(|w| w.used_percent),
        "Claude OAuth response parsed"
    );
    Ok(snapshot)
}

/// Parses `claude usage` text output.
pub(crate) fn parse_claude_cli_output(body: &str) -> Result<UsageSnapshot, FetchError> {
    let snapshot = parse::snapshot_from_text(body);
    if !snapshot.has_data() {
        let first_line = body.lines().next().unwrap_or_default().trim();
        return Err(FetchError::InvalidResponse(format!(
            "no usage lines in claude output: {first_line}"
        )));
    }
    Ok(snapshot)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oauth_response() {
        let json = r#"{
            "five_hour": {"utilization": 25.5, "resets_at": "2025-01-01T12:00:00Z"},
            "seven_day": {"utilization": 45.0, "resets_at": "2025-01-05T00:00:00Z"},
            "seven_day_opus": null,
            "seven_day_sonnet": {"utilization": 30.0, "resets_at": "2025-01-05T00:00:00Z"}
        }"#;
        let snapshot = parse_claude_oauth_response(json).unwrap();

        let session = snapshot.primary.unwrap();
        assert!((session.used_percent - 25.5).abs() < f64::EPSILON);
        assert_eq!(session.window_minutes, Some(300));

        let weekly = snapshot.secondary.unwrap();
        assert_eq!(weekly.window_minutes, Some(DEFAULT_WEEKLY_WINDOW_MINUTES));
        assert!(weekly.resets_at.is_some());

        assert!((snapshot.tertiary.unwrap().used_percent - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_empty_object() {
        let snapshot = parse_claude_oauth_response("{}").unwrap();
        assert!(snapshot.primary.is_none());
        assert!(!snapshot.has_data());
    }

    #[test]
    fn test_null_utilization_dropped() {
        let json = r#"{"five_hour": {"utilization": null, "resets_at": null}}"#;
        assert!(parse_claude_oauth_response(json).unwrap().primary.is_none());
    }

    #[test]
    fn test_invalid_reset_timestamp_ignored() {
        let json = r#"{"seven_day": {"utilization": 10, "resets_at": "not-a-date"}}"#;
        let weekly = parse_claude_oauth_response(json).unwrap().secondary.unwrap();
        assert!(weekly.resets_at.is_none());
    }

    #[test]
    fn test_parse_cli_output() {
        let text = "Current session: 8% used (resets 4pm)\nCurrent week (all models): 61% used\n";
        let snapshot = parse_claude_cli_output(text).unwrap();
        assert!((snapshot.secondary.unwrap().used_percent - 61.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_cli_output_without_usage() {
        let err = parse_claude_cli_output("Please run /login\n").unwrap_err();
        assert!(err.to_string().contains("Please run /login"));
    }
}
