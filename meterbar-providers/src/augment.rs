//! Augment Code provider.

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};

use crate::descriptor::{AccountInjection, ProviderDescriptor};
use crate::parse::{self, Counters};
use crate::strategies::{HttpAuth, HttpSpec, StrategySpec};

const USAGE_URL: &str = "https://api.augmentcode.com/v1/usage";

/// Creates the Augment provider descriptor.
pub fn augment_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Augment)
        .metadata(ProviderMetadata {
            session_label: "Completions".to_string(),
            weekly_label: "Tokens".to_string(),
            requires_manual_cookie_source: true,
            dashboard_url: Some("https://app.augmentcode.com/settings".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Augment)
        })
        .strategy(StrategySpec::Http(HttpSpec {
            id: "augment.web",
            kind: FetchKind::Web,
            url: USAGE_URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth: HttpAuth::Cookie,
            parser: parse_augment_usage,
        }))
        .token_accounts(AccountInjection::CookieHeader)
        .build()
}

fn parse_augment_usage(body: &str) -> Result<UsageSnapshot, FetchError> {
    let counters: Counters = parse::json(body, "Augment usage response")?;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = counters.completions();
    snapshot.secondary = counters.tokens();
    snapshot.identity = parse::identity(
        ProviderKind::Augment,
        counters.email,
        counters.plan,
        LoginMethod::Cookie,
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_usage() {
        let json = r#"{"completionsUsed": 40, "completionLimit": 160, "tokensUsed": 9000, "tokenLimit": 10000, "resetAt": "2025-02-01T00:00:00Z", "plan": "Developer"}"#;
        let snapshot = parse_augment_usage(json).unwrap();
        assert!((snapshot.primary.unwrap().used_percent - 25.0).abs() < 1e-9);
        let tokens = snapshot.secondary.unwrap();
        assert!((tokens.used_percent - 90.0).abs() < 1e-9);
        assert!(tokens.resets_at.is_some());
    }

    #[test]
    fn test_parse_missing_limits() {
        let snapshot = parse_augment_usage(r#"{"completionsUsed": 40}"#).unwrap();
        assert!(!snapshot.has_data());
    }
}
