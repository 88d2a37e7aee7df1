//! Codex response parsing.
//!
//! Two formats:
//! - `codex usage --json`: `session` / `weekly` windows with `used_percent`,
//!   `window_minutes` and an RFC 3339 `resets_at`
//! - the `ChatGPT` usage endpoint: `rate_limit.primary_window` /
//!   `secondary_window` with `limit_window_seconds` and unix `reset_at`

use meterbar_core::{LoginMethod, ProviderKind, RateWindow, UsageSnapshot};
use meterbar_fetch::FetchError;
use serde::Deserialize;
use tracing::debug;

use crate::parse;

// ============================================================================
// CLI format
// ============================================================================

#[derive(Debug, Deserialize)]
struct CodexCliResponse {
    session: Option<CodexUsageWindow>,
    weekly: Option<CodexUsageWindow>,
    account: Option<CodexAccount>,
}

#[derive(Debug, Deserialize)]
struct CodexUsageWindow {
    used_percent: Option<f64>,
    window_minutes: Option<u32>,
    resets_at: Option<String>,
    reset_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodexAccount {
    email: Option<String>,
    organization: Option<String>,
    plan: Option<String>,
}

/// Parses `codex usage --json` output.
pub(crate) fn parse_codex_cli_output(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: CodexCliResponse = parse::json(body, "Codex CLI output")?;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = response.session.and_then(cli_window);
    snapshot.secondary = response.weekly.and_then(cli_window);

    if let Some(account) = response.account {
        snapshot.identity = parse::identity(
            ProviderKind::Codex,
            account.email,
            account.plan,
            LoginMethod::Cli,
        )
        .map(|mut identity| {
            identity.account_organization = account.organization;
            identity
        });
    }

    debug!(
        has_primary = snapshot.primary.is_some(),
        has_secondary = snapshot.secondary.is_some(),
        "Codex CLI output parsed"
    );
    Ok(snapshot)
}

fn cli_window(window: CodexUsageWindow) -> Option<RateWindow> {
    let mut result = RateWindow::new(window.used_percent?);
    result.window_minutes = window.window_minutes;
    result.resets_at = window.resets_at.as_deref().and_then(parse::timestamp);
    result.reset_description = window.reset_description;
    Some(result)
}

// ============================================================================
// OAuth format
// ============================================================================

#[derive(Debug, Deserialize)]
struct CodexUsageResponse {
    plan_type: Option<String>,
    email: Option<String>,
    rate_limit: Option<CodexRateLimit>,
}

#[derive(Debug, Deserialize)]
struct CodexRateLimit {
    primary_window: Option<CodexRateWindow>,
    secondary_window: Option<CodexRateWindow>,
}

#[derive(Debug, Deserialize)]
struct CodexRateWindow {
    used_percent: f64,
    limit_window_seconds: Option<u64>,
    reset_at: Option<i64>,
}

/// Parses the `ChatGPT` backend usage response.
pub(crate) fn parse_codex_oauth_response(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: CodexUsageResponse = parse::json(body, "Codex usage response")?;

    let mut snapshot = UsageSnapshot::new();
    if let Some(limits) = response.rate_limit {
        snapshot.primary = limits.primary_window.map(oauth_window);
        snapshot.secondary = limits.secondary_window.map(oauth_window);
    }
    snapshot.identity = parse::identity(
        ProviderKind::Codex,
        response.email,
        response.plan_type,
        LoginMethod::OAuth,
    );
    Ok(snapshot)
}

fn oauth_window(window: CodexRateWindow) -> RateWindow {
    let mut result = RateWindow::new(window.used_percent);
    result.window_minutes = window
        .limit_window_seconds
        .and_then(|secs| u32::try_from(secs / 60).ok());
    result.resets_at = window.reset_at.and_then(parse::unix_seconds);
    result
}

// ============================================================================
// Tests
// ============================================================================
