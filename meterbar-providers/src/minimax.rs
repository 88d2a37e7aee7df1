//! `MiniMax` provider.
//!
//! The same usage endpoint accepts the dashboard session cookie or an API
//! key. The cookie strategy comes first; it needs a manual header. A state
//! file left by the desktop app is the last resort.

use std::path::PathBuf;

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, RateWindow, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};
use serde::Deserialize;

use crate::descriptor::{AccountInjection, ProviderDescriptor};
use crate::parse::{self, Counters};
use crate::strategies::{HttpAuth, HttpSpec, LocalFileSpec, StrategySpec, TokenSource};

const USAGE_URL: &str = "https://api.minimax.chat/v1/usage";

const API_SOURCES: &[TokenSource] = &[
    TokenSource::Env("MINIMAX_API_KEY"),
    TokenSource::Keychain {
        service: crate::KEYCHAIN_SERVICE,
        account: "minimax-api-key",
        pointer: None,
    },
];

/// Creates the `MiniMax` provider descriptor.
pub fn minimax_descriptor() -> ProviderDescriptor {
    let spec = |id, kind, auth| HttpSpec {
        id,
        kind,
        url: USAGE_URL,
        lookup: None,
        method: HttpMethod::Get,
        body: None,
        headers: &[],
        auth,
        parser: parse_minimax_usage,
    };

    ProviderDescriptor::builder(ProviderKind::MiniMax)
        .metadata(ProviderMetadata {
            session_label: "Tokens".to_string(),
            weekly_label: "Credits".to_string(),
            requires_manual_cookie_source: true,
            dashboard_url: Some("https://www.minimax.io/user-center/basic-information".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::MiniMax)
        })
        .aliases(&["hailuo"])
        .env_keys(&["MINIMAX_API_KEY"])
        .strategy(StrategySpec::Http(spec("minimax.web", FetchKind::Web, HttpAuth::Cookie)))
        .strategy(StrategySpec::Http(spec(
            "minimax.api",
            FetchKind::ApiToken,
            HttpAuth::Bearer(API_SOURCES),
        )))
        .strategy(StrategySpec::LocalFile(LocalFileSpec {
            id: "minimax.local",
            path: state_file,
            parser: parse_minimax_usage,
        }))
        .token_accounts(AccountInjection::CookieHeader)
        .build()
}

fn state_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("minimax").join("state.json"))
}

#[derive(Debug, Deserialize)]
struct MiniMaxUsageResponse {
    balance: Option<f64>,
    #[serde(flatten)]
    counters: Counters,
}

/// Parses the usage response. The prepaid balance, when reported, is noted
/// on the credit window.
fn parse_minimax_usage(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: MiniMaxUsageResponse = parse::json(body, "MiniMax usage response")?;
    let counters = response.counters;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = counters.tokens();
    snapshot.secondary = counters.credits().map(|window| with_balance(window, response.balance));
    snapshot.identity = parse::identity(
        ProviderKind::MiniMax,
        counters.email,
        counters.plan,
        LoginMethod::Cookie,
    );
    Ok(snapshot)
}

fn with_balance(mut window: RateWindow, balance: Option<f64>) -> RateWindow {
    if let Some(balance) = balance {
        window.reset_description = Some(format!("balance {balance:.2}"));
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usage() {
        let json = r#"{"tokensUsed": 250000, "tokenLimit": 1000000, "creditsUsed": 5.0, "creditLimit": 20.0, "balance": 15.0, "resetAt": "2025-02-01T00:00:00Z"}"#;
        let snapshot = parse_minimax_usage(json).unwrap();
        assert!((snapshot.primary.unwrap().used_percent - 25.0).abs() < 1e-9);
        let credits = snapshot.secondary.unwrap();
        assert!((credits.used_percent - 25.0).abs() < 1e-9);
        assert_eq!(credits.reset_description.as_deref(), Some("balance 15.00"));
    }

    #[test]
    fn test_plan_order_prefers_cookie() {
        let desc = minimax_descriptor();
        assert_eq!(desc.fetch_plan.strategy_ids(), vec!["minimax.web", "minimax.api", "minimax.local"]);
    }
}
