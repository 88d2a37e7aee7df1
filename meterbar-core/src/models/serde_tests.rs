//! Serde tests for the persisted and JSON-rendered core types.
//!
//! These pin the wire names that settings files and `--format json`
//! output depend on.

use chrono::{Duration, Utc};

use crate::{
    CredentialSource, FetchSource, LoginMethod, ProviderIdentity, ProviderKind, RateWindow,
    TokenSnapshot, UsageSnapshot,
};

// ============================================================================
// ProviderKind
// ============================================================================

#[test]
fn test_provider_kind_serde_matches_cli_name() {
    for kind in ProviderKind::all() {
        let json = serde_json::to_string(kind).unwrap();
        assert_eq!(json, format!("\"{}\"", kind.cli_name()));
    }
}

#[test]
fn test_provider_kind_invalid_deserialize() {
    let result: Result<ProviderKind, _> = serde_json::from_str(r#""invalid_provider""#);
    assert!(result.is_err());
}

// ============================================================================
// UsageSnapshot
// ============================================================================

#[test]
fn test_usage_snapshot_full_roundtrip() {
    let reset = Utc::now() + Duration::hours(3);
    let mut snapshot = UsageSnapshot::new();
    snapshot.primary = Some(
        RateWindow::new(45.5)
            .with_window_minutes(300)
            .with_resets_at(reset),
    );
    snapshot.secondary = Some(RateWindow::new(12.0).with_window_minutes(10_080));
    snapshot.fetch_source = FetchSource::OAuth;

    let mut identity = ProviderIdentity::new(ProviderKind::Claude);
    identity.account_email = Some("dev@example.com".to_string());
    identity.login_method = Some(LoginMethod::OAuth);
    snapshot.identity = Some(identity);

    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: UsageSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, snapshot);
    assert!(json.contains(r#""fetch_source":"oauth""#));
}

#[test]
fn test_deserialize_minimal_usage_snapshot() {
    let json = r#"{"primary":null,"secondary":null,"tertiary":null,"updated_at":"2024-01-15T10:00:00Z","identity":null}"#;
    let snapshot: UsageSnapshot = serde_json::from_str(json).unwrap();
    assert!(!snapshot.has_data());
    assert_eq!(snapshot.fetch_source, FetchSource::Auto);
}

#[test]
fn test_rate_window_without_start_field() {
    let json = r#"{"used_percent":30.0,"window_minutes":null,"resets_at":null,"reset_description":null}"#;
    let window: RateWindow = serde_json::from_str(json).unwrap();
    assert!(window.window_start.is_none());
    assert_eq!(window.remaining_percent(), 70.0);
}

// ============================================================================
// Credentials and cost
// ============================================================================

#[test]
fn test_credential_source_unit_variants() {
    let cases = [
        (CredentialSource::Auto, r#"{"type":"auto"}"#),
        (CredentialSource::Off, r#"{"type":"off"}"#),
        (CredentialSource::CookieHeader, r#"{"type":"cookie_header"}"#),
        (CredentialSource::ApiToken, r#"{"type":"api_token"}"#),
    ];
    for (source, expected) in cases {
        assert_eq!(serde_json::to_string(&source).unwrap(), expected);
    }
}

#[test]
fn test_token_snapshot_error_skipped_when_absent() {
    let json = serde_json::to_string(&TokenSnapshot::new()).unwrap();
    assert!(!json.contains("error"));

    let failed = serde_json::to_string(&TokenSnapshot::failed("boom")).unwrap();
    assert!(failed.contains(r#""error":"boom""#));
}
