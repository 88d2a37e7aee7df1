//! Cursor provider.
//!
//! Cursor reports request counts on its web dashboard API. The request needs
//! the `WorkosCursorSessionToken` cookie, which must be supplied manually
//! (or pinned to the cookie cache with the `cookie_header` source).

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};
use serde::Deserialize;

use crate::descriptor::{AccountInjection, ProviderDescriptor};
use crate::parse::{self, Counters};
use crate::strategies::{HttpAuth, HttpSpec, StrategySpec};

const USAGE_URL: &str = "https://www.cursor.com/api/usage";

/// Creates the Cursor provider descriptor.
pub fn cursor_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Cursor)
        .metadata(ProviderMetadata {
            session_label: "Premium".to_string(),
            weekly_label: "Slow".to_string(),
            requires_manual_cookie_source: true,
            cookie_name: Some("WorkosCursorSessionToken".to_string()),
            dashboard_url: Some("https://www.cursor.com/settings".to_string()),
            status_link_url: Some("https://status.cursor.com".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Cursor)
        })
        .strategy(StrategySpec::Http(HttpSpec {
            id: "cursor.web",
            kind: FetchKind::Web,
            url: USAGE_URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth: HttpAuth::Cookie,
            parser: parse_cursor_usage,
        }))
        .token_accounts(AccountInjection::CookieHeader)
        .build()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorUsageResponse {
    premium_requests: Option<f64>,
    premium_limit: Option<f64>,
    slow_requests: Option<f64>,
    slow_limit: Option<f64>,
    #[serde(flatten)]
    counters: Counters,
}

/// Parses the dashboard usage response: premium requests are the primary
/// window, slow requests the secondary.
fn parse_cursor_usage(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: CursorUsageResponse = parse::json(body, "Cursor usage response")?;
    let counters = &response.counters;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = counters.window(response.premium_requests, response.premium_limit);
    snapshot.secondary = counters.window(response.slow_requests, response.slow_limit);
    snapshot.identity = parse::identity(
        ProviderKind::Cursor,
        response.counters.email.clone(),
        response.counters.plan.clone(),
        LoginMethod::Cookie,
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usage() {
        let json = r#"{
            "premiumRequests": 150, "premiumLimit": 500,
            "slowRequests": 20, "slowLimit": 0,
            "periodStart": "2025-01-01T00:00:00Z", "periodEnd": "2025-02-01T00:00:00Z",
            "plan": "Pro", "email": "dev@example.com"
        }"#;
        let snapshot = parse_cursor_usage(json).unwrap();

        let premium = snapshot.primary.unwrap();
        assert!((premium.used_percent - 30.0).abs() < 1e-9);
        assert!(premium.window_start.is_some());
        assert!(premium.resets_at.is_some());

        // zero limit means no quota, not 0%
        assert!(snapshot.secondary.is_none());
        assert_eq!(snapshot.identity.unwrap().plan_name.as_deref(), Some("Pro"));
    }

    #[test]
    fn test_descriptor_requires_manual_cookie() {
        let desc = cursor_descriptor();
        assert!(desc.metadata.requires_manual_cookie_source);
        assert_eq!(desc.fetch_plan.strategy_ids(), vec!["cursor.web"]);
    }
}
