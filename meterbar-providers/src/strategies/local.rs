//! Local-file strategy.

use std::path::PathBuf;

use async_trait::async_trait;
use meterbar_core::ProviderKind;
use meterbar_fetch::{FetchContext, FetchError, FetchKind, FetchResult, FetchStrategy};
use tracing::{debug, instrument};

use super::{UsageParser, finish};

/// Declarative description of a local-file strategy.
#[derive(Debug, Clone)]
pub struct LocalFileSpec {
    /// Strategy identifier.
    pub id: &'static str,
    /// Resolves the file location.
    pub path: fn() -> Option<PathBuf>,
    /// Parser for the file contents.
    pub parser: UsageParser,
}

/// Reads usage a provider's own tooling caches on disk.
pub struct LocalFileStrategy {
    provider: ProviderKind,
    spec: LocalFileSpec,
    path_override: Option<PathBuf>,
}

impl LocalFileStrategy {
    /// Creates the strategy.
    pub fn new(provider: ProviderKind, spec: LocalFileSpec) -> Self {
        Self {
            provider,
            spec,
            path_override: None,
        }
    }

    /// Reads from `path` instead of the declared location.
    #[must_use]
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path_override = Some(path);
        self
    }

    fn path(&self) -> Option<PathBuf> {
        self.path_override.clone().or_else(|| (self.spec.path)())
    }
}

#[async_trait]
impl FetchStrategy for LocalFileStrategy {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn kind(&self) -> FetchKind {
        FetchKind::LocalFile
    }

    async fn is_available(&self, _ctx: &FetchContext) -> bool {
        let Some(path) = self.path() else {
            return false;
        };
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        debug!(path = %path.display(), exists, "Local state file lookup");
        exists
    }

    #[instrument(skip(self, _ctx), fields(provider = %self.provider, strategy = self.spec.id))]
    async fn fetch(&self, _ctx: &FetchContext) -> Result<FetchResult, FetchError> {
        let path = self.path().ok_or_else(|| {
            FetchError::CredentialUnavailable("no home directory".to_string())
        })?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::CredentialUnavailable(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(FetchError::StrategyFailed(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };
        finish(
            self.provider,
            self.spec.parser,
            &content,
            self.spec.id,
            FetchKind::LocalFile,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterbar_core::{RateWindow, UsageSnapshot};
    use meterbar_fetch::testing;

    fn parse_number(body: &str) -> Result<UsageSnapshot, FetchError> {
        let used: f64 = body
            .trim()
            .parse()
            .map_err(|_| FetchError::InvalidResponse("not a number".to_string()))?;
        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = Some(RateWindow::new(used));
        Ok(snapshot)
    }

    fn spec() -> LocalFileSpec {
        LocalFileSpec {
            id: "factory.local",
            path: || None,
            parser: parse_number,
        }
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "61.5").unwrap();

        let ctx = testing::context();
        let strategy = LocalFileStrategy::new(ProviderKind::Factory, spec()).with_path(path);
        assert!(strategy.is_available(&ctx).await);

        let result = strategy.fetch(&ctx).await.unwrap();
        assert_eq!(result.kind, FetchKind::LocalFile);
        assert!((result.snapshot.primary.unwrap().used_percent - 61.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context();
        let strategy = LocalFileStrategy::new(ProviderKind::Factory, spec())
            .with_path(dir.path().join("absent.json"));

        assert!(!strategy.is_available(&ctx).await);
        assert!(strategy.fetch(&ctx).await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn test_unresolvable_path() {
        let ctx = testing::context();
        let strategy = LocalFileStrategy::new(ProviderKind::Factory, spec());
        assert!(!strategy.is_available(&ctx).await);
    }
}
