//! Compact status text, as a menu bar item would show it.

use clap::ValueEnum;
use meterbar_core::RateWindow;

/// What the compact status text shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DisplayMode {
    /// Session percentage (e.g. `45%`).
    #[default]
    Percent,
    /// Weekly quota left (e.g. `62%`), falling back to the session percentage.
    Pace,
    /// Both (e.g. `45% · 62%`).
    Both,
}

/// Session percentage, used or remaining, clamped to 0..=100.
pub fn percent_text(window: Option<&RateWindow>, show_used: bool) -> Option<String> {
    let window = window?;
    let percent = if show_used {
        window.used_percent
    } else {
        window.remaining_percent()
    };
    Some(format!("{:.0}%", percent.clamp(0.0, 100.0)))
}

/// Remaining weekly quota, clamped to 0..=100.
pub fn secondary_quota_text(window: Option<&RateWindow>) -> Option<String> {
    window.map(|w| format!("{:.0}%", w.remaining_percent().clamp(0.0, 100.0)))
}

/// Compact text for `mode`, or `None` when neither window is present.
pub fn display_text(
    mode: DisplayMode,
    percent_window: Option<&RateWindow>,
    pace_window: Option<&RateWindow>,
    show_used: bool,
) -> Option<String> {
    let primary = percent_text(percent_window, show_used);
    let secondary = secondary_quota_text(pace_window);
    match mode {
        DisplayMode::Percent => primary,
        DisplayMode::Pace => secondary.or(primary),
        DisplayMode::Both => match (primary, secondary) {
            (Some(p), Some(s)) => Some(format!("{p} · {s}")),
            (p, s) => p.or(s),
        },
    }
}
