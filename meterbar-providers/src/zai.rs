//! z.ai provider.
//!
//! API-token only. The token comes from `Z_AI_API_KEY` (or `ZAI_API_KEY`),
//! meterbar's keychain item, or a variable pinned with the `environment`
//! credential source.

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};

use crate::descriptor::{AccountInjection, ProviderDescriptor};
use crate::parse::{self, Counters};
use crate::strategies::{HttpAuth, HttpSpec, StrategySpec, TokenSource};

const USAGE_URL: &str = "https://api.z.ai/v1/usage";

const API_SOURCES: &[TokenSource] = &[
    TokenSource::Env("Z_AI_API_KEY"),
    TokenSource::Env("ZAI_API_KEY"),
    TokenSource::Keychain {
        service: crate::KEYCHAIN_SERVICE,
        account: "zai-api-key",
        pointer: None,
    },
];

/// Creates the z.ai provider descriptor.
pub fn zai_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Zai)
        .metadata(ProviderMetadata {
            session_label: "Tokens".to_string(),
            weekly_label: "Credits".to_string(),
            dashboard_url: Some("https://z.ai/settings".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Zai)
        })
        .aliases(&["z.ai", "glm"])
        .env_keys(&["Z_AI_API_KEY", "ZAI_API_KEY"])
        .strategy(StrategySpec::Http(HttpSpec {
            id: "zai.api",
            kind: FetchKind::ApiToken,
            url: USAGE_URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth: HttpAuth::Bearer(API_SOURCES),
            parser: parse_zai_usage,
        }))
        .token_accounts(AccountInjection::Environment("Z_AI_API_KEY"))
        .build()
}

fn parse_zai_usage(body: &str) -> Result<UsageSnapshot, FetchError> {
    let counters: Counters = parse::json(body, "z.ai usage response")?;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = counters.tokens();
    snapshot.secondary = counters.credits();
    snapshot.identity = parse::identity(
        ProviderKind::Zai,
        counters.email,
        counters.plan,
        LoginMethod::ApiKey,
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meterbar_core::CredentialSource;
    use meterbar_fetch::testing::{self, ScriptedHttp};
    use meterbar_fetch::{FetchSettings, SourceMode};

    const BODY: &str = r#"{"tokensUsed": 300, "tokenLimit": 1000, "resetAt": "2025-02-01T00:00:00Z", "plan": "Lite"}"#;

    #[test]
    fn test_parse_usage() {
        let snapshot = parse_zai_usage(BODY).unwrap();
        assert!((snapshot.primary.unwrap().used_percent - 30.0).abs() < 1e-9);
        assert!(snapshot.secondary.is_none());
        assert_eq!(snapshot.identity.unwrap().login_method, Some(LoginMethod::ApiKey));
    }

    #[tokio::test]
    async fn test_environment_source_end_to_end() {
        let http = Arc::new(ScriptedHttp::default().with_response(USAGE_URL, 200, BODY));
        let ctx = testing::builder()
            .http(http)
            .env("MY_ZAI_KEY", "secret")
            .settings(FetchSettings {
                source_mode: SourceMode::Api,
                credential_source: CredentialSource::Environment("MY_ZAI_KEY".to_string()),
                ..FetchSettings::default()
            })
            .build();

        let outcome = zai_descriptor().build_pipeline(&ctx.settings).execute(&ctx).await;
        let result = outcome.result.unwrap();
        assert_eq!(result.snapshot.fetch_source, meterbar_core::FetchSource::Api);
    }

    #[tokio::test]
    async fn test_missing_key_exhausts() {
        let ctx = testing::context();
        let outcome = zai_descriptor().build_pipeline(&ctx.settings).execute(&ctx).await;
        assert_eq!(outcome.attempts.len(), 1);
        assert!(!outcome.attempts[0].was_available);
        assert!(matches!(
            outcome.result,
            Err(FetchError::AllStrategiesExhausted { .. })
        ));
    }
}
