//! Credential source selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which credential a provider refresh is allowed to use.
///
/// `Auto` lets every strategy run in declared order. The other variants
/// narrow the eligible strategies to the ones consuming that credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "key", rename_all = "snake_case")]
pub enum CredentialSource {
    /// Try every available credential.
    #[default]
    Auto,
    /// Use only the manually configured cookie header.
    Manual,
    /// Do not fetch this provider.
    Off,
    /// Read an API token from the named environment variable.
    Environment(String),
    /// Use a cookie header (cached or manual).
    CookieHeader,
    /// Use an OAuth access token.
    #[serde(rename = "oauth_token")]
    OAuthToken,
    /// Use an API token from the credential store.
    ApiToken,
}

impl CredentialSource {
    /// Returns true if nothing may be fetched.
    pub fn is_off(&self) -> bool {
        matches!(self, Self::Off)
    }

    /// Returns true if OAuth strategies are eligible.
    pub fn allows_oauth(&self) -> bool {
        matches!(self, Self::Auto | Self::OAuthToken)
    }

    /// Returns true if API-token strategies are eligible.
    pub fn allows_api_token(&self) -> bool {
        matches!(self, Self::Auto | Self::ApiToken | Self::Environment(_))
    }

    /// Returns true if cookie-header strategies are eligible.
    pub fn allows_cookie_header(&self) -> bool {
        matches!(self, Self::Auto | Self::Manual | Self::CookieHeader)
    }

    /// Returns true if CLI and local-file strategies are eligible.
    pub fn allows_ambient(&self) -> bool {
        matches!(self, Self::Auto)
    }

    /// The environment variable pinned by this source, if any.
    pub fn env_key(&self) -> Option<&str> {
        match self {
            Self::Environment(key) => Some(key),
            _ => None,
        }
    }

    /// Short label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Off => "off",
            Self::Environment(_) => "environment",
            Self::CookieHeader => "cookie",
            Self::OAuthToken => "oauth",
            Self::ApiToken => "api",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment(key) => write!(f, "environment({key})"),
            other => f.write_str(other.label()),
        }
    }
}

// ============================================================================
// Token Account
// ============================================================================

/// One stored account for a provider: a cookie header or token.
///
/// A provider with several accounts is refreshed once per account and the
/// results are merged into a single snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    /// User-facing name for the account.
    pub label: String,
    /// Cookie header or token.
    pub token: String,
}

impl TokenAccount {
    /// Creates an account.
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for TokenAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAccount")
            .field("label", &self.label)
            .field("token", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_allows_everything() {
        let source = CredentialSource::Auto;
        assert!(source.allows_oauth());
        assert!(source.allows_api_token());
        assert!(source.allows_cookie_header());
        assert!(source.allows_ambient());
    }

    #[test]
    fn test_pinned_sources_narrow() {
        assert!(!CredentialSource::OAuthToken.allows_api_token());
        assert!(!CredentialSource::ApiToken.allows_cookie_header());
        assert!(CredentialSource::Manual.allows_cookie_header());
        assert!(!CredentialSource::Manual.allows_ambient());

        let env = CredentialSource::Environment("ZAI_API_KEY".to_string());
        assert!(env.allows_api_token());
        assert_eq!(env.env_key(), Some("ZAI_API_KEY"));
        assert_eq!(env.to_string(), "environment(ZAI_API_KEY)");
    }

    #[test]
    fn test_off_allows_nothing() {
        let off = CredentialSource::Off;
        assert!(off.is_off());
        assert!(!off.allows_oauth());
        assert!(!off.allows_api_token());
        assert!(!off.allows_cookie_header());
        assert!(!off.allows_ambient());
    }

    #[test]
    fn test_serde_tagged() {
        let json = serde_json::to_string(&CredentialSource::Environment("K".into())).unwrap();
        assert_eq!(json, r#"{"type":"environment","key":"K"}"#);
        let parsed: CredentialSource = serde_json::from_str(r#"{"type":"oauth_token"}"#).unwrap();
        assert_eq!(parsed, CredentialSource::OAuthToken);
    }

    #[test]
    fn test_token_account_debug_hides_token() {
        let account = TokenAccount::new("work", "sessionKey=secret");
        let debug = format!("{account:?}");
        assert!(debug.contains("work"));
        assert!(!debug.contains("secret"));
    }
}
