//! Factory (Droid) provider.
//!
//! The Droid CLI stores a `WorkOS` access token in
//! `<config_dir>/factory/auth.json`; that token is tried first, then a
//! manually supplied dashboard cookie, then the CLI's cached state file.

use std::path::PathBuf;

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};

use crate::descriptor::{AccountInjection, ProviderDescriptor};
use crate::parse::{self, Counters};
use crate::strategies::{HttpAuth, HttpSpec, LocalFileSpec, StrategySpec, TokenSource};

const USAGE_URL: &str = "https://app.factory.ai/api/usage";

const OAUTH_SOURCES: &[TokenSource] = &[TokenSource::JsonFile {
    path: auth_file,
    pointer: "/access_token",
}];

/// Creates the Factory provider descriptor.
pub fn factory_descriptor() -> ProviderDescriptor {
    let spec = |id, kind, auth| HttpSpec {
        id,
        kind,
        url: USAGE_URL,
        lookup: None,
        method: HttpMethod::Get,
        body: None,
        headers: &[],
        auth,
        parser: parse_factory_usage,
    };

    ProviderDescriptor::builder(ProviderKind::Factory)
        .metadata(ProviderMetadata {
            session_label: "Tokens".to_string(),
            weekly_label: "Requests".to_string(),
            requires_manual_cookie_source: true,
            dashboard_url: Some("https://app.factory.ai/settings".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Factory)
        })
        .aliases(&["droid"])
        .strategy(StrategySpec::Http(spec(
            "factory.oauth",
            FetchKind::OAuth,
            HttpAuth::Bearer(OAUTH_SOURCES),
        )))
        .strategy(StrategySpec::Http(spec("factory.web", FetchKind::Web, HttpAuth::Cookie)))
        .strategy(StrategySpec::LocalFile(LocalFileSpec {
            id: "factory.local",
            path: state_file,
            parser: parse_factory_usage,
        }))
        .token_accounts(AccountInjection::CookieHeader)
        .build()
}

fn auth_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("factory").join("auth.json"))
}

/// Last usage the Droid CLI cached, same shape as the API response.
fn state_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("factory").join("state.json"))
}

fn parse_factory_usage(body: &str) -> Result<UsageSnapshot, FetchError> {
    let counters: Counters = parse::json(body, "Factory usage response")?;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = counters.tokens();
    snapshot.secondary = counters.requests();
    snapshot.identity = parse::identity(
        ProviderKind::Factory,
        counters.email,
        counters.plan,
        LoginMethod::OAuth,
    );
    Ok(snapshot)
}
