//! Kiro provider.
//!
//! Runs `kiro usage` and scrapes the credit line. Output looks like:
//!
//! ```text
//! Account: dev@example.com
//! Plan: Pro
//! Credits: 120/500
//! ```

use std::time::Duration;

use meterbar_core::{LoginMethod, ProviderKind, ProviderMetadata, RateWindow, UsageSnapshot};
use meterbar_fetch::FetchError;

use crate::descriptor::ProviderDescriptor;
use crate::parse;
use crate::strategies::{CliSpec, StrategySpec};

/// Creates the Kiro provider descriptor.
pub fn kiro_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::builder(ProviderKind::Kiro)
        .metadata(ProviderMetadata {
            session_label: "Credits".to_string(),
            weekly_label: "Bonus".to_string(),
            dashboard_url: Some("https://kiro.dev/settings".to_string()),
            ..ProviderMetadata::for_provider(ProviderKind::Kiro)
        })
        .aliases(&["kiro-cli"])
        .strategy(StrategySpec::Cli(CliSpec {
            id: "kiro.cli",
            command: "kiro",
            args: &["usage"],
            parser: parse_kiro_output,
            timeout: Duration::from_secs(15),
        }))
        .refresh_cadence(Duration::from_secs(600))
        .build()
}

/// Credits line first, then any labelled percentage line.
fn parse_kiro_output(body: &str) -> Result<UsageSnapshot, FetchError> {
    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = parse::credits(body)
        .and_then(|(used, limit)| parse::percent_of(used, limit))
        .map(RateWindow::new)
        .or_else(|| {
            parse::percent_lines(body)
                .first()
                .map(|line| RateWindow::new(line.used_percent))
        });

    if snapshot.primary.is_none() {
        return Err(FetchError::InvalidResponse(
            "no credit or percentage line in kiro output".to_string(),
        ));
    }
    snapshot.identity = parse::identity(
        ProviderKind::Kiro,
        parse::email(body),
        parse::plan(body),
        LoginMethod::Cli,
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meterbar_fetch::testing::{self, ScriptedRunner};

    #[test]
    fn test_parse_credits() {
        let snapshot = parse_kiro_output("Account: dev@example.com\nPlan: Pro\nCredits: 120/500\n").unwrap();
        assert!((snapshot.primary.unwrap().used_percent - 24.0).abs() < 1e-9);
        let identity = snapshot.identity.unwrap();
        assert_eq!(identity.account_email.as_deref(), Some("dev@example.com"));
        assert_eq!(identity.plan_name.as_deref(), Some("Pro"));
    }

    #[test]
    fn test_parse_percent_fallback() {
        let snapshot = parse_kiro_output("Usage: 75% used\n").unwrap();
        assert!((snapshot.primary.unwrap().used_percent - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_kiro_output("kiro: command requires login").is_err());
    }

    #[tokio::test]
    async fn test_pipeline_runs_cli() {
        let runner = Arc::new(ScriptedRunner::default().with_output("kiro", "Credits: 50/100\n"));
        let ctx = testing::builder().runner(runner.clone()).build();

        let outcome = kiro_descriptor().build_pipeline(&ctx.settings).execute(&ctx).await;
        assert_eq!(outcome.successful_strategy(), Some("kiro.cli"));
        assert_eq!(runner.calls(), 1);
    }
}
