//! Claude provider descriptor.

use std::path::PathBuf;
use std::time::Duration;

use meterbar_core::{ProviderKind, ProviderMetadata};
use meterbar_fetch::{FetchKind, HttpMethod};

use super::parser::{parse_claude_cli_output, parse_claude_oauth_response};
use crate::descriptor::{AccountInjection, ProviderDescriptor};
use crate::strategies::{CliSpec, HttpAuth, HttpSpec, StrategySpec, TokenSource, UrlLookup};

const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const ORGANIZATIONS_URL: &str = "https://claude.ai/api/organizations";
const WEB_USAGE_URL: &str = "https://claude.ai/api/organizations/{id}/usage";

const OAUTH_SOURCES: &[TokenSource] = &[
    TokenSource::Env("CLAUDE_CODE_OAUTH_TOKEN"),
    TokenSource::JsonFile {
        path: credentials_file,
        pointer: "/claudeAiOauth/accessToken",
    },
    TokenSource::Keychain {
        service: crate::KEYCHAIN_SERVICE,
        account: "claude-oauth",
        pointer: None,
    },
];

/// Creates the Claude provider descriptor.
pub fn claude_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Claude)
        .metadata(claude_metadata())
        .aliases(&["anthropic"])
        .token_cost(claude_log_directory)
        .strategy(StrategySpec::Http(HttpSpec {
            id: "claude.oauth",
            kind: FetchKind::OAuth,
            url: USAGE_URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[("anthropic-beta", "oauth-2025-04-20")],
            auth: HttpAuth::Bearer(OAUTH_SOURCES),
            parser: parse_claude_oauth_response,
        }))
        .strategy(StrategySpec::Http(HttpSpec {
            id: "claude.web",
            kind: FetchKind::Web,
            url: WEB_USAGE_URL,
            lookup: Some(UrlLookup {
                url: ORGANIZATIONS_URL,
                pointer: "/0/uuid",
            }),
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth: HttpAuth::Cookie,
            parser: parse_claude_oauth_response,
        }))
        .strategy(StrategySpec::Cli(CliSpec {
            id: "claude.cli",
            command: "claude",
            args: &["usage"],
            parser: parse_claude_cli_output,
            timeout: Duration::from_secs(30),
        }))
        .token_accounts(AccountInjection::CookieHeader)
        .refresh_cadence(Duration::from_secs(120))
        .build()
}

fn claude_metadata() -> ProviderMetadata {
    ProviderMetadata {
        tertiary_label: Some("Opus".to_string()),
        default_enabled: true,
        is_primary_provider: true,
        supports_login_flow: true,
        supports_pace: true,
        requires_manual_cookie_source: true,
        cookie_name: Some("sessionKey".to_string()),
        dashboard_url: Some("https://claude.ai/settings/usage".to_string()),
        status_link_url: Some("https://status.anthropic.com".to_string()),
        ..ProviderMetadata::for_provider(ProviderKind::Claude)
    }
}

fn claude_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claude"))
}

fn credentials_file() -> Option<PathBuf> {
    claude_home().map(|d| d.join(".credentials.json"))
}

/// Claude Code keeps per-project JSONL transcripts here.
fn claude_log_directory() -> Option<PathBuf> {
    claude_home().map(|d| d.join("projects"))
}
