//! Generic fetch strategies driven by descriptor data.
//!
//! Providers do not implement [`FetchStrategy`] themselves. Each descriptor
//! lists [`StrategySpec`]s (what to run and how to parse it) and the
//! registry instantiates one of three generic strategies per spec:
//!
//! - [`CliStrategy`] - runs a CLI tool through the [`CliRunner`](meterbar_fetch::CliRunner)
//! - [`HttpStrategy`] - one authenticated request through the [`HttpApi`](meterbar_fetch::HttpApi)
//! - [`LocalFileStrategy`] - reads a file the provider's own tooling writes

mod cli;
mod http;
mod local;

pub use cli::{CliSpec, CliStrategy};
pub use http::{HttpAuth, HttpSpec, HttpStrategy, TokenSource, UrlLookup};
pub use local::{LocalFileSpec, LocalFileStrategy};

use meterbar_core::{ProviderKind, ProviderMetadata, UsageSnapshot};
use meterbar_fetch::{FetchError, FetchKind, FetchResult, FetchStrategy};

/// Turns a raw response body into a snapshot.
pub type UsageParser = fn(&str) -> Result<UsageSnapshot, FetchError>;

// ============================================================================
// Strategy Spec
// ============================================================================

/// One entry of a provider's ordered fetch plan.
#[derive(Debug, Clone)]
pub enum StrategySpec {
    /// Run a CLI tool.
    Cli(CliSpec),
    /// Make one HTTP request.
    Http(HttpSpec),
    /// Read a local file.
    LocalFile(LocalFileSpec),
}

impl StrategySpec {
    /// Strategy identifier (e.g., `claude.oauth`).
    pub fn id(&self) -> &'static str {
        match self {
            Self::Cli(spec) => spec.id,
            Self::Http(spec) => spec.id,
            Self::LocalFile(spec) => spec.id,
        }
    }

    /// The acquisition mechanism, used for eligibility filtering.
    pub fn kind(&self) -> FetchKind {
        match self {
            Self::Cli(_) => FetchKind::Cli,
            Self::Http(spec) => spec.kind,
            Self::LocalFile(_) => FetchKind::LocalFile,
        }
    }

    /// Creates the runnable strategy for this spec.
    pub fn instantiate(&self, metadata: &ProviderMetadata) -> Box<dyn FetchStrategy> {
        match self {
            Self::Cli(spec) => Box::new(CliStrategy::new(metadata.id, spec.clone())),
            Self::Http(spec) => Box::new(HttpStrategy::new(metadata, spec.clone())),
            Self::LocalFile(spec) => Box::new(LocalFileStrategy::new(metadata.id, spec.clone())),
        }
    }
}

/// Runs a parser and turns its output into a result.
///
/// The snapshot is sanitized before it leaves the strategy. A body that
/// parses but carries no windows is an invalid response, not a success.
pub(crate) fn finish(
    provider: ProviderKind,
    parser: UsageParser,
    body: &str,
    strategy_id: &str,
    kind: FetchKind,
) -> Result<FetchResult, FetchError> {
    let mut snapshot = parser(body)?;
    snapshot.sanitize();
    if !snapshot.has_data() {
        return Err(FetchError::InvalidResponse(format!(
            "{} response carried no usage windows",
            provider.display_name()
        )));
    }
    if let Some(identity) = &snapshot.identity {
        if identity.provider_id != provider {
            snapshot.identity = None;
        }
    }
    Ok(FetchResult::new(snapshot, strategy_id, kind))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterbar_core::{ProviderIdentity, RateWindow};

    fn parse_one(body: &str) -> Result<UsageSnapshot, FetchError> {
        let used: f64 = body
            .trim()
            .parse()
            .map_err(|_| FetchError::InvalidResponse(body.to_string()))?;
        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = Some(RateWindow::new(used));
        snapshot.identity = Some(ProviderIdentity::new(ProviderKind::Codex));
        Ok(snapshot)
    }

    fn parse_empty(_: &str) -> Result<UsageSnapshot, FetchError> {
        Ok(UsageSnapshot::new())
    }

    #[test]
    fn test_finish_sanitizes_and_stamps() {
        let result = finish(ProviderKind::Codex, parse_one, "140", "codex.cli", FetchKind::Cli)
            .unwrap();
        assert!((result.snapshot.primary.unwrap().used_percent - 100.0).abs() < f64::EPSILON);
        assert_eq!(result.strategy_id, "codex.cli");
        assert_eq!(result.snapshot.fetch_source, meterbar_core::FetchSource::Cli);
    }

    #[test]
    fn test_finish_rejects_empty_snapshot() {
        let err = finish(ProviderKind::Zai, parse_empty, "{}", "zai.api", FetchKind::ApiToken)
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidResponse(_)));
    }

    #[test]
    fn test_finish_drops_foreign_identity() {
        let result =
            finish(ProviderKind::Claude, parse_one, "10", "claude.cli", FetchKind::Cli).unwrap();
        assert!(result.snapshot.identity.is_none());
    }
}
