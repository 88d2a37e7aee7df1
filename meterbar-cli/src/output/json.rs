//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use meterbar_core::{
    DailyUsageEntry, ProviderKind, RateWindow, TokenSnapshot, UsageSnapshot, WeeklyDetail,
};
use meterbar_fetch::FetchAttempt;
use meterbar_providers::ProviderDescriptor;
use meterbar_store::RefreshOutcome;
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for a single provider's usage.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderOutput {
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Usage windows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<WindowOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<WindowOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tertiary: Option<WindowOutput>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityOutput>,
}

/// A single usage window.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowOutput {
    pub used_percent: f64,
    pub remaining_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_description: Option<String>,
}

/// Identity info.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_method: Option<String>,
}

/// Weekly pace output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaceOutput<'a> {
    pub provider: ProviderKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pace: Option<&'a WeeklyDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a str>,
}

/// Attempt log output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptsOutput<'a> {
    pub provider: ProviderKind,
    pub attempts: &'a [FetchAttempt],
}

/// Token cost output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostOutput<'a> {
    pub provider: ProviderKind,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    pub daily: &'a [DailyUsageEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

/// Provider info output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfoOutput {
    pub id: ProviderKind,
    pub display_name: String,
    pub cli_name: String,
    pub aliases: Vec<String>,
    pub default_enabled: bool,
    pub supports_pace: bool,
    pub supports_token_cost: bool,
    pub strategies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env_keys: Vec<String>,
    pub supports_token_accounts: bool,
    pub refresh_cadence_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_link_url: Option<String>,
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats a list, unwrapping a single element.
    fn format_list<T: Serialize>(&self, items: &[T]) -> Result<String> {
        match items {
            [single] => self.format(single),
            _ => self.format(items),
        }
    }

    /// Formats refresh outcomes.
    pub fn format_outcomes(&self, outcomes: &[RefreshOutcome]) -> Result<String> {
        let outputs: Vec<ProviderOutput> = outcomes.iter().map(outcome_to_output).collect();
        self.format_list(&outputs)
    }

    /// Formats weekly pace results.
    pub fn format_pace(
        &self,
        rows: &[(ProviderKind, Option<WeeklyDetail>, Option<String>)],
    ) -> Result<String> {
        let outputs: Vec<PaceOutput> = rows
            .iter()
            .map(|(provider, detail, summary)| PaceOutput {
                provider: *provider,
                pace: detail.as_ref(),
                summary: summary.as_deref(),
            })
            .collect();
        self.format_list(&outputs)
    }

    /// Formats attempt logs.
    pub fn format_attempts(&self, rows: &[(ProviderKind, Vec<FetchAttempt>)]) -> Result<String> {
        let outputs: Vec<AttemptsOutput> = rows
            .iter()
            .map(|(provider, attempts)| AttemptsOutput {
                provider: *provider,
                attempts,
            })
            .collect();
        self.format_list(&outputs)
    }

    /// Formats token cost results.
    pub fn format_costs(&self, rows: &[(ProviderKind, TokenSnapshot)]) -> Result<String> {
        let outputs: Vec<CostOutput> = rows
            .iter()
            .map(|(provider, cost)| CostOutput {
                provider: *provider,
                updated_at: cost.updated_at,
                total_tokens: cost.last_30_days_tokens,
                total_cost_usd: cost.last_30_days_cost_usd,
                daily: &cost.daily,
                error: cost.error.as_deref(),
            })
            .collect();
        self.format_list(&outputs)
    }

    /// Formats provider list.
    pub fn format_providers(&self, providers: &[ProviderDescriptor]) -> Result<String> {
        let outputs: Vec<ProviderInfoOutput> = providers
            .iter()
            .map(|desc| ProviderInfoOutput {
                id: desc.id,
                display_name: desc.display_name().to_string(),
                cli_name: desc.cli_name().to_string(),
                aliases: desc.cli.aliases.iter().map(ToString::to_string).collect(),
                default_enabled: desc.metadata.default_enabled,
                supports_pace: desc.supports_pace(),
                supports_token_cost: desc.supports_token_cost(),
                strategies: desc
                    .fetch_plan
                    .strategy_ids()
                    .into_iter()
                    .map(ToString::to_string)
                    .collect(),
                env_keys: desc.env_keys.iter().map(ToString::to_string).collect(),
                supports_token_accounts: desc.token_accounts.is_some(),
                refresh_cadence_secs: desc.refresh_cadence.as_secs(),
                dashboard_url: desc.metadata.dashboard_url.clone(),
                status_link_url: desc.metadata.status_link_url.clone(),
            })
            .collect();

        self.format(&outputs)
    }
}

fn outcome_to_output(outcome: &RefreshOutcome) -> ProviderOutput {
    ProviderOutput {
        provider: outcome.provider,
        source: outcome
            .snapshot
            .as_ref()
            .map(|s| s.fetch_source.to_string().to_lowercase()),
        strategy: outcome.strategy_id.clone(),
        usage: outcome.snapshot.as_ref().map(snapshot_to_output),
        error: outcome.error.clone(),
    }
}

fn snapshot_to_output(snapshot: &UsageSnapshot) -> UsageOutput {
    UsageOutput {
        primary: snapshot.primary.as_ref().map(window_to_output),
        secondary: snapshot.secondary.as_ref().map(window_to_output),
        tertiary: snapshot.tertiary.as_ref().map(window_to_output),
        updated_at: snapshot.updated_at,
        identity: snapshot.identity.as_ref().map(|id| IdentityOutput {
            account_email: id.account_email.clone(),
            account_organization: id.account_organization.clone(),
            plan_name: id.plan_name.clone(),
            login_method: id
                .login_method
                .map(|m| format!("{m:?}").to_lowercase()),
        }),
    }
}

fn window_to_output(window: &RateWindow) -> WindowOutput {
    WindowOutput {
        used_percent: window.used_percent,
        remaining_percent: window.remaining_percent(),
        window_minutes: window.window_minutes,
        resets_at: window.resets_at,
        reset_description: window.reset_description.clone(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterbar_core::FetchSource;
    use meterbar_providers::ProviderRegistry;
    use serde_json::Value;

    fn success() -> RefreshOutcome {
        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = Some(RateWindow::new(25.0).with_window_minutes(300));
        snapshot.fetch_source = FetchSource::Cli;
        RefreshOutcome {
            provider: ProviderKind::Codex,
            snapshot: Some(snapshot),
            strategy_id: Some("codex.cli".to_string()),
            error: None,
            attempts: vec![],
        }
    }

    fn failure() -> RefreshOutcome {
        RefreshOutcome {
            provider: ProviderKind::Zai,
            snapshot: None,
            strategy_id: None,
            error: Some("All strategies exhausted".to_string()),
            attempts: vec![],
        }
    }

    #[test]
    fn test_format_pretty_and_compact() {
        let data = serde_json::json!({"key": "value"});
        assert!(JsonFormatter::new(true).format(&data).unwrap().contains('\n'));
        assert!(!JsonFormatter::new(false).format(&data).unwrap().contains('\n'));
    }

    #[test]
    fn test_single_outcome_is_an_object() {
        let json = JsonFormatter::new(false).format_outcomes(&[success()]).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["provider"], "codex");
        assert_eq!(value["source"], "cli");
        assert_eq!(value["strategy"], "codex.cli");
        assert_eq!(value["usage"]["primary"]["usedPercent"], 25.0);
        assert_eq!(value["usage"]["primary"]["remainingPercent"], 75.0);
        assert_eq!(value["usage"]["primary"]["windowMinutes"], 300);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_many_outcomes_are_an_array() {
        let json = JsonFormatter::new(false)
            .format_outcomes(&[success(), failure()])
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["provider"], "zai");
        assert_eq!(items[1]["error"], "All strategies exhausted");
        assert!(items[1].get("usage").is_none());
    }

    #[test]
    fn test_providers_list() {
        let registry = ProviderRegistry::new();
        let json = JsonFormatter::new(false).format_providers(registry.all()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), ProviderKind::all().len());
        let codex = items.iter().find(|p| p["id"] == "codex").unwrap();
        assert_eq!(codex["supportsPace"], true);
        assert_eq!(codex["supportsTokenCost"], true);
        assert!(codex["strategies"].as_array().unwrap().contains(&Value::from("codex.cli")));
        assert!(codex.get("envKeys").is_none());
        assert_eq!(codex["supportsTokenAccounts"], false);

        let zai = items.iter().find(|p| p["id"] == "zai").unwrap();
        assert_eq!(zai["envKeys"][0], "Z_AI_API_KEY");
        assert_eq!(zai["supportsTokenAccounts"], true);
    }

    #[test]
    fn test_cost_failure_reports_error() {
        let json = JsonFormatter::new(false)
            .format_costs(&[(ProviderKind::Claude, TokenSnapshot::failed("timed out"))])
            .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["provider"], "claude");
        assert_eq!(value["error"], "timed out");
        assert!(value.get("totalTokens").is_none());
    }
}
