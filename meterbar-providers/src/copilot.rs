//! GitHub Copilot provider.
//!
//! Quotas come from `copilot_internal/user`. The token is either the OAuth
//! token the Copilot editor plugins store in `hosts.json`, or a GitHub token
//! from the environment or meterbar's keychain item.

use std::path::PathBuf;

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, RateWindow, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};
use serde::Deserialize;

use crate::descriptor::ProviderDescriptor;
use crate::parse;
use crate::strategies::{HttpAuth, HttpSpec, StrategySpec, TokenSource};

const USER_URL: &str = "https://api.github.com/copilot_internal/user";

const HEADERS: &[(&str, &str)] = &[("X-GitHub-Api-Version", "2022-11-28")];

const OAUTH_SOURCES: &[TokenSource] = &[TokenSource::JsonFile {
    path: hosts_file,
    pointer: "/github.com/oauth_token",
}];

const API_SOURCES: &[TokenSource] = &[
    TokenSource::Env("COPILOT_API_TOKEN"),
    TokenSource::Env("GITHUB_TOKEN"),
    TokenSource::Keychain {
        service: crate::KEYCHAIN_SERVICE,
        account: "copilot-token",
        pointer: None,
    },
];

/// Creates the Copilot provider descriptor.
pub fn copilot_descriptor() -> ProviderDescriptor {
    let spec = |id, kind, sources| HttpSpec {
        id,
        kind,
        url: USER_URL,
        lookup: None,
        method: HttpMethod::Get,
        body: None,
        headers: HEADERS,
        auth: HttpAuth::Bearer(sources),
        parser: parse_copilot_user,
    };

    ProviderDescriptor::builder(ProviderKind::Copilot)
        .metadata(ProviderMetadata {
            session_label: "Premium".to_string(),
            weekly_label: "Chat".to_string(),
            supports_login_flow: true,
            dashboard_url: Some("https://github.com/settings/copilot".to_string()),
            status_link_url: Some("https://www.githubstatus.com".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Copilot)
        })
        .aliases(&["github"])
        .env_keys(&["COPILOT_API_TOKEN", "GITHUB_TOKEN"])
        .strategy(StrategySpec::Http(spec("copilot.oauth", FetchKind::OAuth, OAUTH_SOURCES)))
        .strategy(StrategySpec::Http(spec("copilot.api", FetchKind::ApiToken, API_SOURCES)))
        .build()
}

fn hosts_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("github-copilot").join("hosts.json"))
}

#[derive(Debug, Deserialize)]
struct CopilotUserResponse {
    copilot_plan: Option<String>,
    quota_reset_date: Option<String>,
    #[serde(default)]
    quota_snapshots: QuotaSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct QuotaSnapshots {
    premium_interactions: Option<QuotaSnapshot>,
    chat: Option<QuotaSnapshot>,
}

#[derive(Debug, Deserialize)]
struct QuotaSnapshot {
    percent_remaining: Option<f64>,
    #[serde(default)]
    unlimited: bool,
}

impl QuotaSnapshot {
    fn into_window(self, reset: Option<&str>) -> Option<RateWindow> {
        if self.unlimited {
            return None;
        }
        let mut window = RateWindow::new(100.0 - self.percent_remaining?);
        window.resets_at = reset.and_then(parse::timestamp);
        Some(window)
    }
}

/// Parses `copilot_internal/user`. Unlimited quotas produce no window.
fn parse_copilot_user(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: CopilotUserResponse = parse::json(body, "Copilot user response")?;
    let reset = response.quota_reset_date.as_deref();

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = response
        .quota_snapshots
        .premium_interactions
        .and_then(|q| q.into_window(reset));
    snapshot.secondary = response.quota_snapshots.chat.and_then(|q| q.into_window(reset));
    snapshot.identity = parse::identity(
        ProviderKind::Copilot,
        None,
        response.copilot_plan,
        LoginMethod::OAuth,
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meterbar_fetch::testing::{self, ScriptedHttp};

    const BODY: &str = r#"{
        "copilot_plan": "individual",
        "quota_reset_date": "2025-02-01",
        "quota_snapshots": {
            "premium_interactions": {"entitlement": 300, "remaining": 225, "percent_remaining": 75.0, "unlimited": false},
            "chat": {"entitlement": 0, "remaining": 0, "percent_remaining": 100.0, "unlimited": true}
        }
    }"#;

    #[test]
    fn test_parse_user() {
        let snapshot = parse_copilot_user(BODY).unwrap();
        let premium = snapshot.primary.unwrap();
        assert!((premium.used_percent - 25.0).abs() < f64::EPSILON);
        assert!(premium.resets_at.is_some());
        assert!(snapshot.secondary.is_none());
        assert_eq!(
            snapshot.identity.unwrap().plan_name.as_deref(),
            Some("individual")
        );
    }

    #[tokio::test]
    async fn test_api_token_strategy_after_missing_oauth() {
        let http = Arc::new(ScriptedHttp::default().with_response(USER_URL, 200, BODY));
        let ctx = testing::builder()
            .http(http.clone())
            .env("GITHUB_TOKEN", "ghp_test")
            .build();

        let mut desc = copilot_descriptor();
        // the real hosts.json must not leak into the test
        desc.fetch_plan.strategies.retain(|s| s.id() != "copilot.oauth");

        let outcome = desc.build_pipeline(&ctx.settings).execute(&ctx).await;
        assert_eq!(outcome.successful_strategy(), Some("copilot.api"));
        assert!(
            http.requests()[0]
                .headers
                .iter()
                .any(|(n, v)| n == "Authorization" && v == "Bearer ghp_test")
        );
    }
}
