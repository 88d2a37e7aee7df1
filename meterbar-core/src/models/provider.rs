//! Provider-related types.
//!
//! This module contains types related to usage providers:
//! - [`ProviderKind`] - Enum of supported providers
//! - [`ProviderIdentity`] - Account identity (siloed per provider)
//! - [`ProviderMetadata`] - Display info and capability flags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ============================================================================
// Provider Kind
// ============================================================================

/// Supported provider kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `OpenAI` Codex
    Codex,
    /// Anthropic Claude
    Claude,
    /// Cursor IDE
    Cursor,
    /// GitHub Copilot
    Copilot,
    /// Augment Code
    Augment,
    /// `MiniMax`
    MiniMax,
    /// Factory (Droid)
    Factory,
    /// z.ai
    Zai,
    /// Google Gemini
    Gemini,
    /// Kiro
    Kiro,
}

impl ProviderKind {
    /// Returns the display name for this provider.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Codex => "Codex",
            Self::Claude => "Claude",
            Self::Cursor => "Cursor",
            Self::Copilot => "Copilot",
            Self::Augment => "Augment",
            Self::MiniMax => "MiniMax",
            Self::Factory => "Factory",
            Self::Zai => "z.ai",
            Self::Gemini => "Gemini",
            Self::Kiro => "Kiro",
        }
    }

    /// Returns all provider kinds in registration order.
    pub fn all() -> &'static [ProviderKind] {
        &[
            Self::Codex,
            Self::Claude,
            Self::Cursor,
            Self::Copilot,
            Self::Augment,
            Self::MiniMax,
            Self::Factory,
            Self::Zai,
            Self::Gemini,
            Self::Kiro,
        ]
    }

    /// Returns the CLI name for this provider (lowercase, no spaces).
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Cursor => "cursor",
            Self::Copilot => "copilot",
            Self::Augment => "augment",
            Self::MiniMax => "minimax",
            Self::Factory => "factory",
            Self::Zai => "zai",
            Self::Gemini => "gemini",
            Self::Kiro => "kiro",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|k| k.cli_name() == needle)
            .ok_or_else(|| CoreError::UnknownProvider(s.to_string()))
    }
}

// ============================================================================
// Provider Identity
// ============================================================================

/// Account identity information for a provider.
///
/// Siloed per provider: identity from one provider is never attached to
/// another provider's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// The provider this identity belongs to.
    pub provider_id: ProviderKind,
    /// Account email address.
    pub account_email: Option<String>,
    /// Organization name (if applicable).
    pub account_organization: Option<String>,
    /// Plan/subscription name.
    pub plan_name: Option<String>,
    /// How the user authenticated.
    pub login_method: Option<LoginMethod>,
}

impl ProviderIdentity {
    /// Creates a new identity for the given provider.
    pub fn new(provider_id: ProviderKind) -> Self {
        Self {
            provider_id,
            account_email: None,
            account_organization: None,
            plan_name: None,
            login_method: None,
        }
    }

    /// Returns a display string for this identity.
    pub fn display_string(&self) -> String {
        match (&self.account_email, &self.account_organization) {
            (Some(email), Some(org)) => format!("{email} ({org})"),
            (Some(email), None) => email.clone(),
            (None, Some(org)) => org.clone(),
            (None, None) => self.provider_id.display_name().to_string(),
        }
    }
}

/// How the user authenticated with a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// OAuth 2.0 token.
    OAuth,
    /// API key or token.
    #[default]
    ApiKey,
    /// Session cookie header.
    Cookie,
    /// CLI tool session.
    Cli,
}

// ============================================================================
// Provider Metadata
// ============================================================================

/// Static display info and capability flags for a provider.
///
/// Read-only after registration; consumed by the fetch pipeline (for
/// eligibility) and by the pace model (for `supports_pace`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProviderMetadata {
    /// The provider this metadata describes.
    pub id: ProviderKind,
    /// Display name.
    pub display_name: String,
    /// Label for the primary window (e.g., "Session", "Monthly").
    pub session_label: String,
    /// Label for the secondary window (e.g., "Weekly").
    pub weekly_label: String,
    /// Label for the tertiary window, when the provider reports one.
    pub tertiary_label: Option<String>,
    /// Whether enabled by default.
    pub default_enabled: bool,
    /// Whether this is considered a primary provider.
    pub is_primary_provider: bool,
    /// Whether the provider has an interactive login flow.
    pub supports_login_flow: bool,
    /// Whether cookie strategies only run with a manually supplied header.
    pub requires_manual_cookie_source: bool,
    /// Whether the secondary window has weekly pace semantics.
    pub supports_pace: bool,
    /// Name of the session cookie the web strategies look for.
    pub cookie_name: Option<String>,
    /// URL to the provider's usage dashboard.
    pub dashboard_url: Option<String>,
    /// URL to the provider's status page.
    pub status_link_url: Option<String>,
}

impl ProviderMetadata {
    /// Creates default metadata for a provider kind.
    pub fn for_provider(kind: ProviderKind) -> Self {
        Self {
            id: kind,
            display_name: kind.display_name().to_string(),
            session_label: "Session".to_string(),
            weekly_label: "Weekly".to_string(),
            tertiary_label: None,
            default_enabled: false,
            is_primary_provider: false,
            supports_login_flow: false,
            requires_manual_cookie_source: false,
            supports_pace: false,
            cookie_name: None,
            dashboard_url: None,
            status_link_url: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
