//! Merging per-account results.
//!
//! A provider with several stored accounts keeps one cached snapshot. Each
//! window slot takes the most constrained account's window, so the merged
//! snapshot never reports more headroom than the tightest account has.

use meterbar_core::{RateWindow, UsageSnapshot};

/// Merges snapshots given in account order. `None` for an empty input.
///
/// Identity and fetch source come from the first snapshot; `updated_at` is
/// the latest of all.
pub fn merge_account_snapshots(snapshots: Vec<UsageSnapshot>) -> Option<UsageSnapshot> {
    let mut iter = snapshots.into_iter();
    let mut merged = iter.next()?;
    for snapshot in iter {
        merged.primary = tighter(merged.primary.take(), snapshot.primary);
        merged.secondary = tighter(merged.secondary.take(), snapshot.secondary);
        merged.tertiary = tighter(merged.tertiary.take(), snapshot.tertiary);
        merged.updated_at = merged.updated_at.max(snapshot.updated_at);
    }
    Some(merged)
}

fn tighter(current: Option<RateWindow>, other: Option<RateWindow>) -> Option<RateWindow> {
    match (current, other) {
        (Some(a), Some(b)) => Some(if b.used_percent > a.used_percent { b } else { a }),
        (a, b) => a.or(b),
    }
}
