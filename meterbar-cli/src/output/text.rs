//! Text output formatting with progress bars and colors.

use chrono::{DateTime, Duration, Local, Utc};
use meterbar_core::{PaceStage, RateWindow, TokenSnapshot, UsageSnapshot, WeeklyDetail};
use meterbar_fetch::FetchAttempt;
use meterbar_providers::ProviderDescriptor;
use meterbar_store::RefreshOutcome;

use super::display::{DisplayMode, display_text};

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    bar_width: usize,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            bar_width: 10,
        }
    }

    // ========================================================================
    // Usage
    // ========================================================================

    /// Formats a refresh outcome: the snapshot, or the error.
    pub fn format_outcome(&self, outcome: &RefreshOutcome, desc: &ProviderDescriptor) -> String {
        match (&outcome.snapshot, &outcome.error) {
            (Some(snapshot), _) => self.format_usage(snapshot, desc),
            (None, Some(error)) => self.format_error(desc.display_name(), error),
            (None, None) => self.format_error(desc.display_name(), "no data"),
        }
    }

    /// Formats usage for a provider.
    pub fn format_usage(&self, snapshot: &UsageSnapshot, desc: &ProviderDescriptor) -> String {
        let mut lines = Vec::new();
        let meta = &desc.metadata;

        lines.push(format!(
            "{} ({})",
            self.bold(desc.display_name()),
            snapshot.fetch_source.to_string().to_lowercase()
        ));

        if let Some(primary) = &snapshot.primary {
            lines.push(self.format_window(primary, &meta.session_label));
        }
        if let Some(secondary) = &snapshot.secondary {
            lines.push(self.format_window(secondary, &meta.weekly_label));
        }
        if let Some(tertiary) = &snapshot.tertiary {
            let label = meta.tertiary_label.as_deref().unwrap_or("Extra");
            lines.push(self.format_window(tertiary, label));
        }

        if let Some(identity) = &snapshot.identity {
            if let Some(email) = &identity.account_email {
                lines.push(format!("Account: {}", self.cyan(email)));
            }
            if let Some(org) = &identity.account_organization {
                lines.push(format!("Org:     {org}"));
            }
            if let Some(plan) = &identity.plan_name {
                lines.push(format!("Plan:    {}", self.blue(plan)));
            }
        }

        lines.join("\n")
    }

    /// Formats a usage window with progress bar.
    fn format_window(&self, window: &RateWindow, label: &str) -> String {
        let remaining = window.remaining_percent();
        let bar = self.progress_bar(remaining);
        let pct = self.color_for_percent(remaining, &format!("{remaining:.0}% left"));

        let mut result = format!("{:<8} {bar} {pct}", format!("{label}:"));

        if let Some(resets_at) = window.resets_at {
            let reset = format_reset_time(resets_at, Utc::now());
            result.push_str(&format!("\n         Resets {}", self.dim(&reset)));
        } else if let Some(desc) = &window.reset_description {
            result.push_str(&format!("\n         Resets {}", self.dim(desc)));
        }

        result
    }

    /// Formats a progress bar.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn progress_bar(&self, percent_remaining: f64) -> String {
        let fraction = (percent_remaining / 100.0).clamp(0.0, 1.0);
        let filled = (fraction * self.bar_width as f64).round() as usize;
        let empty = self.bar_width.saturating_sub(filled);

        let bar = format!(
            "{}{}",
            BAR_FULL.to_string().repeat(filled),
            BAR_EMPTY.to_string().repeat(empty)
        );

        self.color_for_percent(percent_remaining, &bar)
    }

    // ========================================================================
    // Pace
    // ========================================================================

    /// Formats a weekly pace line.
    pub fn format_pace(&self, desc: &ProviderDescriptor, detail: Option<&WeeklyDetail>) -> String {
        let name = format!("{:<10}", desc.display_name());
        let Some(detail) = detail else {
            return format!("{} {}", self.bold(&name), self.dim("No pace data"));
        };

        let left = match detail.stage {
            PaceStage::OnTrack => self.green(&detail.left_label),
            stage if stage.is_behind() => self.cyan(&detail.left_label),
            PaceStage::SlightlyAhead => self.yellow(&detail.left_label),
            _ => self.red(&detail.left_label),
        };
        let mut line = format!(
            "{} {left} {}",
            self.bold(&name),
            self.dim(&format!("(expected {:.0}% used)", detail.expected_used_percent))
        );
        if let Some(right) = &detail.right_label {
            line.push_str(&format!(" · {right}"));
        }
        line
    }

    // ========================================================================
    // Attempts
    // ========================================================================

    /// Formats the attempt log, most recent first.
    pub fn format_attempts(&self, desc: &ProviderDescriptor, attempts: &[FetchAttempt]) -> String {
        let mut lines = vec![self.bold(desc.display_name())];
        if attempts.is_empty() {
            lines.push(format!("  {}", self.dim("No attempts recorded")));
        }
        for attempt in attempts {
            let time = attempt.attempted_at.with_timezone(&Local).format("%H:%M:%S");
            let line = attempt.diagnostic_line();
            let line = if attempt.error_description.is_some() {
                self.red(&line)
            } else if attempt.was_available {
                self.green(&line)
            } else {
                self.dim(&line)
            };
            lines.push(format!(
                "  {} {line} {}",
                self.dim(&time.to_string()),
                self.dim(&format!("{}ms", attempt.duration.as_millis()))
            ));
        }
        lines.join("\n")
    }

    // ========================================================================
    // Cost
    // ========================================================================

    /// Formats a token cost report.
    #[allow(clippy::cast_precision_loss)]
    pub fn format_cost(&self, cost: &TokenSnapshot, desc: &ProviderDescriptor) -> String {
        let mut lines = Vec::new();

        lines.push(format!("{} Token Cost Report", self.bold(desc.display_name())));
        lines.push("─".repeat(40));

        if let Some(error) = &cost.error {
            lines.push(format!("{} {error}", self.red("Scan failed:")));
            if cost.last_30_days_tokens.is_none() {
                return lines.join("\n");
            }
        }

        lines.push(format!(
            "Tokens (30d): {}",
            format_number(cost.last_30_days_tokens.unwrap_or(0) as f64)
        ));
        match cost.last_30_days_cost_usd {
            Some(usd) => lines.push(format!("Cost (30d):   {}", self.green(&format!("${usd:.2}")))),
            None => lines.push(format!("Cost (30d):   {}", self.dim("not reported"))),
        }

        if !cost.daily.is_empty() {
            lines.push(String::new());
            lines.push(self.dim("Daily breakdown:"));
            for day in &cost.daily {
                let usd = day.cost_usd.map(|c| format!(" (${c:.2})")).unwrap_or_default();
                lines.push(format!(
                    "  {} - {} tokens{usd}",
                    day.date,
                    format_number(day.computed_total_tokens() as f64)
                ));
            }
        }

        lines.push(self.dim(&format!(
            "Scanned {}",
            cost.updated_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        )));
        lines.join("\n")
    }

    // ========================================================================
    // Providers
    // ========================================================================

    /// Formats provider list header.
    pub fn format_providers_header(&self) -> String {
        format!(
            "{:<16} {:<10} {:<8} {:<6} {:<6} {}",
            "Provider", "CLI", "Default", "Pace", "Cost", "Strategies"
        )
    }

    /// Formats a single provider line.
    pub fn format_provider_line(&self, desc: &ProviderDescriptor) -> String {
        let mark = |flag: bool| if flag { "✓" } else { "−" };
        let mut line = format!(
            "{:<16} {:<10} {:<8} {:<6} {:<6} {}",
            desc.display_name(),
            desc.cli_name(),
            mark(desc.metadata.default_enabled),
            mark(desc.supports_pace()),
            mark(desc.supports_token_cost()),
            self.dim(&desc.fetch_plan.strategy_ids().join(", "))
        );
        if !desc.env_keys.is_empty() {
            line.push_str(&self.dim(&format!(" (env: {})", desc.env_keys.join(", "))));
        }
        line
    }

    // ========================================================================
    // Summary (watch)
    // ========================================================================

    /// Formats a compact line per outcome: a bar for the session window
    /// and the status text for `mode`.
    pub fn format_summary(
        &self,
        rows: &[(&ProviderDescriptor, &RefreshOutcome)],
        mode: DisplayMode,
        show_used: bool,
    ) -> String {
        let mut lines = Vec::new();
        for (desc, outcome) in rows {
            let name = format!("{:<12}", desc.display_name());
            let line = match &outcome.snapshot {
                Some(snapshot) => {
                    let primary = snapshot.primary.as_ref();
                    match display_text(mode, primary, snapshot.pace_window(), show_used) {
                        Some(text) => {
                            let remaining = primary.map_or(100.0, RateWindow::remaining_percent);
                            format!(
                                "{name} {} {}",
                                self.progress_bar(remaining),
                                self.color_for_percent(remaining, &text)
                            )
                        }
                        None => format!("{name} {}", self.dim("No data")),
                    }
                }
                None => format!("{name} {}", self.red("Error")),
            };
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Formats an error message.
    pub fn format_error(&self, provider: &str, error: &str) -> String {
        format!("{}: {} - {error}", self.bold(provider), self.red("Error"))
    }

    // ========================================================================
    // Color/style helpers
    // ========================================================================

    fn color_for_percent(&self, percent: f64, text: &str) -> String {
        if percent < 20.0 {
            self.red(text)
        } else if percent < 50.0 {
            self.yellow(text)
        } else {
            self.green(text)
        }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.use_colors {
            format!("{code}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    /// Bold text.
    pub fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn blue(&self, text: &str) -> String {
        self.paint(BLUE, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

/// Reset time as a countdown under a day, otherwise as a local time.
fn format_reset_time(resets_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if resets_at <= now {
        return "now".to_string();
    }

    let diff = resets_at - now;
    if diff < Duration::hours(1) {
        let mins = diff.num_minutes();
        return format!("in {mins} minute{}", if mins == 1 { "" } else { "s" });
    }
    if diff < Duration::hours(24) {
        let hours = diff.num_hours();
        let mins = diff.num_minutes() % 60;
        return if mins > 0 {
            format!("in {hours}h {mins}m")
        } else {
            format!("in {hours} hour{}", if hours == 1 { "" } else { "s" })
        };
    }

    let local = resets_at.with_timezone(&Local);
    let today = now.with_timezone(&Local).date_naive();
    let time = local.format("%l:%M %p").to_string();
    if local.date_naive() == today + chrono::Days::new(1) {
        format!("tomorrow at {}", time.trim())
    } else {
        format!("{} at {}", local.format("%a"), time.trim())
    }
}

fn format_number(n: f64) -> String {
    if n >= 1_000_000.0 {
        format!("{:.1}M", n / 1_000_000.0)
    } else if n >= 1_000.0 {
        format!("{:.1}K", n / 1_000.0)
    } else {
        format!("{n:.0}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterbar_core::{DailyUsageEntry, FetchSource, ProviderIdentity, ProviderKind};
    use meterbar_fetch::FetchKind;
    use meterbar_providers::ProviderRegistry;

    #[test]
    fn test_progress_bar_boundaries() {
        let formatter = TextFormatter::new(false);
        let cases = [
            (0.0, "░░░░░░░░░░"),
            (10.0, "█░░░░░░░░░"),
            (25.0, "███░░░░░░░"),
            (50.0, "█████░░░░░"),
            (100.0, "██████████"),
            (130.0, "██████████"),
        ];
        for (percent, expected) in cases {
            assert_eq!(formatter.progress_bar(percent), expected, "{percent}%");
        }
    }

    #[test]
    fn test_progress_bar_colors() {
        let formatter = TextFormatter::new(true);
        assert!(formatter.progress_bar(10.0).contains(RED));
        assert!(formatter.progress_bar(40.0).contains(YELLOW));
        assert!(formatter.progress_bar(80.0).contains(GREEN));
    }

    #[test]
    fn test_format_usage_uses_provider_labels() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);

        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = Some(RateWindow::new(28.0));
        snapshot.secondary = Some(RateWindow::new(60.0));
        snapshot.fetch_source = FetchSource::OAuth;
        let mut identity = ProviderIdentity::new(ProviderKind::Claude);
        identity.account_email = Some("dev@example.com".to_string());
        snapshot.identity = Some(identity);

        let desc = registry.descriptor(ProviderKind::Claude);
        let output = formatter.format_usage(&snapshot, desc);
        assert!(output.starts_with("Claude (oauth)"));
        assert!(output.contains(&format!("{}:", desc.metadata.session_label)));
        assert!(output.contains("72% left"));
        assert!(output.contains("40% left"));
        assert!(output.contains("dev@example.com"));
    }

    #[test]
    fn test_format_outcome_error() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);
        let outcome = RefreshOutcome {
            provider: ProviderKind::Zai,
            snapshot: None,
            strategy_id: None,
            error: Some("All strategies exhausted".to_string()),
            attempts: vec![],
        };
        let output = formatter.format_outcome(&outcome, registry.descriptor(ProviderKind::Zai));
        assert!(output.ends_with("Error - All strategies exhausted"));
    }

    #[test]
    fn test_format_summary_modes() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);
        let mut snapshot = UsageSnapshot::new();
        snapshot.primary = Some(RateWindow::new(45.0));
        snapshot.secondary = Some(RateWindow::new(38.0));
        let ok = RefreshOutcome {
            provider: ProviderKind::Codex,
            snapshot: Some(snapshot),
            strategy_id: Some("codex.cli".to_string()),
            error: None,
            attempts: vec![],
        };
        let failed = RefreshOutcome {
            provider: ProviderKind::Zai,
            snapshot: None,
            strategy_id: None,
            error: Some("boom".to_string()),
            attempts: vec![],
        };
        let rows = [
            (registry.descriptor(ProviderKind::Codex), &ok),
            (registry.descriptor(ProviderKind::Zai), &failed),
        ];

        let percent = formatter.format_summary(&rows, DisplayMode::Percent, false);
        let lines: Vec<_> = percent.lines().collect();
        assert!(lines[0].starts_with("Codex"));
        assert!(lines[0].ends_with(" 55%"));
        assert!(lines[1].ends_with("Error"));

        let both = formatter.format_summary(&rows, DisplayMode::Both, true);
        assert!(both.lines().next().unwrap().ends_with("45% · 62%"));
    }

    #[test]
    fn test_provider_line_lists_env_keys() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);
        let zai = formatter.format_provider_line(registry.descriptor(ProviderKind::Zai));
        assert!(zai.ends_with("(env: Z_AI_API_KEY, ZAI_API_KEY)"));
        let codex = formatter.format_provider_line(registry.descriptor(ProviderKind::Codex));
        assert!(!codex.contains("env:"));
    }

    #[test]
    fn test_format_attempts() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);
        let attempts = vec![FetchAttempt::success(
            "codex.cli",
            FetchKind::Cli,
            std::time::Duration::from_millis(42),
        )];
        let output = formatter.format_attempts(registry.descriptor(ProviderKind::Codex), &attempts);
        assert!(output.contains("codex.cli (cli) available"));
        assert!(output.contains("42ms"));

        let empty = formatter.format_attempts(registry.descriptor(ProviderKind::Codex), &[]);
        assert!(empty.contains("No attempts recorded"));
    }

    #[test]
    fn test_format_pace() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);
        let detail = WeeklyDetail {
            left_label: "20% in deficit".to_string(),
            right_label: Some("Runs out in 2d 4h".to_string()),
            expected_used_percent: 50.0,
            stage: PaceStage::FarAhead,
        };
        let desc = registry.descriptor(ProviderKind::Codex);
        let line = formatter.format_pace(desc, Some(&detail));
        assert!(line.contains("20% in deficit"));
        assert!(line.contains("(expected 50% used)"));
        assert!(line.ends_with("· Runs out in 2d 4h"));

        assert!(formatter.format_pace(desc, None).contains("No pace data"));
    }

    #[test]
    fn test_format_cost() {
        let registry = ProviderRegistry::new();
        let formatter = TextFormatter::new(false);
        let mut day = DailyUsageEntry::new("2025-03-09");
        day.input_tokens = Some(1_500);
        day.cost_usd = Some(0.5);
        let cost = TokenSnapshot::from_daily(vec![day]);

        let output = formatter.format_cost(&cost, registry.descriptor(ProviderKind::Claude));
        assert!(output.contains("Tokens (30d): 1.5K"));
        assert!(output.contains("$0.50"));
        assert!(output.contains("2025-03-09 - 1.5K tokens ($0.50)"));

        let failed = TokenSnapshot::failed("cost scan timed out");
        let output = formatter.format_cost(&failed, registry.descriptor(ProviderKind::Claude));
        assert!(output.contains("Scan failed: cost scan timed out"));
        assert!(!output.contains("Tokens (30d)"));

        let mut kept = cost.clone();
        kept.error = Some("cost scan timed out".into());
        let output = formatter.format_cost(&kept, registry.descriptor(ProviderKind::Claude));
        assert!(output.contains("Scan failed: cost scan timed out"));
        assert!(output.contains("Tokens (30d): 1.5K"));
    }

    #[test]
    fn test_format_reset_time() {
        let now = Utc::now();
        assert_eq!(format_reset_time(now - Duration::minutes(1), now), "now");
        assert_eq!(format_reset_time(now + Duration::minutes(30), now), "in 30 minutes");
        assert_eq!(format_reset_time(now + Duration::hours(2), now), "in 2 hours");
        assert_eq!(
            format_reset_time(now + Duration::minutes(150), now),
            "in 2h 30m"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(500.0), "500");
        assert_eq!(format_number(1500.0), "1.5K");
        assert_eq!(format_number(1_500_000.0), "1.5M");
    }
}
