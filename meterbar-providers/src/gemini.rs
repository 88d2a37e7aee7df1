//! Google Gemini provider.
//!
//! Uses the OAuth token the Gemini CLI stores in `~/.gemini/oauth_creds.json`
//! against the Cloud Code quota endpoint. The response lists one bucket per
//! model with the fraction remaining; the primary window is the most used
//! Pro bucket and the secondary the most used Flash bucket.

use std::path::PathBuf;

use meterbar_core::{
    LoginMethod, ProviderIdentity, ProviderKind, ProviderMetadata, RateWindow, UsageSnapshot,
};
use meterbar_fetch::{FetchError, FetchKind, HttpMethod};
use serde::Deserialize;

use crate::descriptor::ProviderDescriptor;
use crate::parse;
use crate::strategies::{HttpAuth, HttpSpec, StrategySpec, TokenSource};

const QUOTA_URL: &str = "https://cloudcode-pa.googleapis.com/v1internal:retrieveUserQuota";

const OAUTH_SOURCES: &[TokenSource] = &[TokenSource::JsonFile {
    path: oauth_creds_file,
    pointer: "/access_token",
}];

/// Creates the Gemini provider descriptor.
pub fn gemini_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Gemini)
        .metadata(ProviderMetadata {
            session_label: "Pro".to_string(),
            weekly_label: "Flash".to_string(),
            supports_login_flow: true,
            dashboard_url: Some("https://aistudio.google.com/app/usage".to_string()),
            status_link_url: Some("https://status.cloud.google.com".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Gemini)
        })
        .aliases(&["google"])
        .strategy(StrategySpec::Http(HttpSpec {
            id: "gemini.oauth",
            kind: FetchKind::OAuth,
            url: QUOTA_URL,
            lookup: None,
            method: HttpMethod::Post,
            body: Some("{}"),
            headers: &[],
            auth: HttpAuth::Bearer(OAUTH_SOURCES),
            parser: parse_gemini_quota,
        }))
        .build()
}

fn oauth_creds_file() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".gemini").join("oauth_creds.json"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaResponse {
    #[serde(default)]
    buckets: Vec<QuotaBucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuotaBucket {
    remaining_fraction: Option<f64>,
    reset_time: Option<String>,
    model_id: Option<String>,
}

impl QuotaBucket {
    fn used_percent(&self) -> Option<f64> {
        self.remaining_fraction.map(|f| (1.0 - f) * 100.0)
    }

    fn is_family(&self, family: &str) -> bool {
        self.model_id.as_deref().is_some_and(|m| m.contains(family))
    }
}

/// Most-used bucket of a model family, as a daily window.
fn family_window(buckets: &[QuotaBucket], family: &str) -> Option<RateWindow> {
    let bucket = buckets
        .iter()
        .filter(|b| b.is_family(family))
        .filter_map(|b| Some((b, b.used_percent()?)))
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(bucket, _)| bucket)?;

    let mut window = RateWindow::new(bucket.used_percent()?).with_window_minutes(24 * 60);
    window.resets_at = bucket.reset_time.as_deref().and_then(parse::timestamp);
    Some(window)
}

fn parse_gemini_quota(body: &str) -> Result<UsageSnapshot, FetchError> {
    let response: QuotaResponse = parse::json(body, "Gemini quota response")?;

    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = family_window(&response.buckets, "pro");
    snapshot.secondary = family_window(&response.buckets, "flash");
    if snapshot.has_data() {
        let mut identity = ProviderIdentity::new(ProviderKind::Gemini);
        identity.login_method = Some(LoginMethod::OAuth);
        snapshot.identity = Some(identity);
    }
    Ok(snapshot)
}
