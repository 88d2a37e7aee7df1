//! Integration tests for core snapshot and pace types.

use chrono::{Duration, Utc};
use meterbar_core::{
    DEFAULT_WEEKLY_WINDOW_MINUTES, PacePolicy, ProviderKind, ProviderMetadata, RateWindow,
    UsageSnapshot,
};

#[test]
fn test_snapshot_serialization_roundtrip() {
    let snapshot = UsageSnapshot::new();
    let json = serde_json::to_string(&snapshot).unwrap();
    let parsed: UsageSnapshot = serde_json::from_str(&json).unwrap();
    assert!(!parsed.has_data());
}

#[test]
fn test_rate_window_validation() {
    let mut window = RateWindow::new(50.0);
    assert!(window.validate().is_ok());

    window.used_percent = -10.0;
    assert!(window.validate().is_err());
}

#[test]
fn test_pace_from_secondary_window() {
    let now = Utc::now();
    let mut meta = ProviderMetadata::for_provider(ProviderKind::Claude);
    meta.supports_pace = true;

    let mut snapshot = UsageSnapshot::new();
    snapshot.secondary = Some(
        RateWindow::new(10.0)
            .with_window_minutes(DEFAULT_WEEKLY_WINDOW_MINUTES)
            .with_resets_at(now + Duration::days(3)),
    );

    let window = snapshot.pace_window().unwrap();
    let pace = PacePolicy::default().weekly_pace(&meta, window, now).unwrap();
    assert!(pace.stage.is_behind());
    assert!(pace.will_last_to_reset);
}
