//! Fetch provenance.

use serde::{Deserialize, Serialize};

/// How the usage data in a snapshot was fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    /// Not yet attributed to a strategy.
    #[default]
    Auto,
    /// Via CLI tool (e.g., `codex` CLI).
    Cli,
    /// Via a cookie-authenticated web endpoint.
    Web,
    /// Via OAuth token.
    #[serde(rename = "oauth")]
    OAuth,
    /// Via API key.
    Api,
    /// Via a local state file.
    LocalFile,
}

impl FetchSource {
    /// Returns a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Cli => "CLI",
            Self::Web => "Web",
            Self::OAuth => "OAuth",
            Self::Api => "API",
            Self::LocalFile => "Local",
        }
    }
}

impl std::fmt::Display for FetchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_source_display() {
        assert_eq!(FetchSource::Cli.to_string(), "CLI");
        assert_eq!(FetchSource::LocalFile.to_string(), "Local");
        assert_eq!(
            serde_json::to_string(&FetchSource::LocalFile).unwrap(),
            "\"local_file\""
        );
    }
}
