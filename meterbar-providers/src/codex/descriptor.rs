//! Codex provider descriptor.

use std::path::PathBuf;
use std::time::Duration;

use meterbar_core::{ProviderKind, ProviderMetadata};
use meterbar_fetch::{FetchKind, HttpMethod};

use super::parser::{parse_codex_cli_output, parse_codex_oauth_response};
use crate::descriptor::ProviderDescriptor;
use crate::strategies::{CliSpec, HttpAuth, HttpSpec, StrategySpec, TokenSource};

const USAGE_URL: &str = "https://chatgpt.com/backend-api/wham/usage";

const OAUTH_SOURCES: &[TokenSource] = &[TokenSource::JsonFile {
    path: auth_file,
    pointer: "/tokens/access_token",
}];

/// Creates the Codex provider descriptor.
pub fn codex_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Codex)
        .metadata(codex_metadata())
        .aliases(&["openai"])
        .token_cost(codex_log_directory)
        .strategy(StrategySpec::Http(HttpSpec {
            id: "codex.oauth",
            kind: FetchKind::OAuth,
            url: USAGE_URL,
            lookup: None,
            method: HttpMethod::Get,
            body: None,
            headers: &[],
            auth: HttpAuth::Bearer(OAUTH_SOURCES),
            parser: parse_codex_oauth_response,
        }))
        .strategy(StrategySpec::Cli(CliSpec {
            id: "codex.cli",
            command: "codex",
            args: &["usage", "--json"],
            parser: parse_codex_cli_output,
            timeout: Duration::from_secs(20),
        }))
        .refresh_cadence(Duration::from_secs(120))
        .build()
}

fn codex_metadata() -> ProviderMetadata {
    ProviderMetadata {
        default_enabled: true,
        is_primary_provider: true,
        supports_login_flow: true,
        supports_pace: true,
        dashboard_url: Some("https://platform.openai.com/usage".to_string()),
        status_link_url: Some("https://status.openai.com".to_string()),
        ..ProviderMetadata::for_provider(ProviderKind::Codex)
    }
}

fn codex_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".codex"))
}

fn auth_file() -> Option<PathBuf> {
    codex_home().map(|d| d.join("auth.json"))
}

/// Codex writes one JSONL session log per conversation here.
fn codex_log_directory() -> Option<PathBuf> {
    codex_home().map(|d| d.join("sessions"))
}
