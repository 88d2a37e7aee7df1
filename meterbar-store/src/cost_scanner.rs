//! Local token usage scanning.
//!
//! Walks a provider's session log directory for `.jsonl` files and sums
//! token counts per day. Two line shapes are understood:
//!
//! - Claude Code: `{"timestamp", "message": {"id", "model", "usage": {...}}, "costUSD"}`
//! - Codex: `{"timestamp", "payload": {"type": "token_count", "info": {"last_token_usage": {...}}}}`
//!
//! Lines of any other shape are skipped. The scan is blocking file I/O;
//! async callers run it on the blocking pool.

use chrono::{DateTime, Utc};
use meterbar_core::{DailyUsageEntry, TokenSnapshot};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

use crate::error::StoreError;

/// Days covered by a scan.
pub const SCAN_DAYS: i64 = 30;

// ============================================================================
// Line shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct LogLine {
    timestamp: Option<String>,
    message: Option<ClaudeMessage>,
    payload: Option<CodexPayload>,
    #[serde(rename = "costUSD")]
    cost_usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessage {
    id: Option<String>,
    model: Option<String>,
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClaudeUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_read_input_tokens: u64,
    cache_creation_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct CodexPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    info: Option<CodexInfo>,
}

#[derive(Debug, Deserialize)]
struct CodexInfo {
    last_token_usage: Option<CodexTokens>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CodexTokens {
    input_tokens: u64,
    cached_input_tokens: u64,
    output_tokens: u64,
}

/// Token counts pulled from one line.
struct LineUsage {
    input: u64,
    output: u64,
    cache_read: u64,
    cache_creation: u64,
    model: Option<String>,
    cost_usd: Option<f64>,
}

impl LogLine {
    fn usage(self, seen: &mut HashSet<String>) -> Option<LineUsage> {
        if let Some(message) = self.message {
            let usage = message.usage?;
            // Claude Code repeats a message once per content block.
            if let Some(id) = message.id {
                if !seen.insert(id) {
                    return None;
                }
            }
            return Some(LineUsage {
                input: usage.input_tokens,
                output: usage.output_tokens,
                cache_read: usage.cache_read_input_tokens,
                cache_creation: usage.cache_creation_input_tokens,
                model: message.model,
                cost_usd: self.cost_usd,
            });
        }

        let payload = self.payload?;
        if payload.kind.as_deref() != Some("token_count") {
            return None;
        }
        let info = payload.info?;
        let tokens = info.last_token_usage?;
        Some(LineUsage {
            input: tokens.input_tokens.saturating_sub(tokens.cached_input_tokens),
            output: tokens.output_tokens,
            cache_read: tokens.cached_input_tokens,
            cache_creation: 0,
            model: info.model,
            cost_usd: None,
        })
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Scans `dir` for the [`SCAN_DAYS`] days before `now`.
///
/// A missing directory is an empty result, not an error.
///
/// # Errors
///
/// Returns `StoreError::Io` if `dir` exists but cannot be listed.
#[instrument(skip(dir, now), fields(dir = %dir.display()))]
pub fn scan_logs(dir: &Path, now: DateTime<Utc>) -> Result<TokenSnapshot, StoreError> {
    if !dir.exists() {
        debug!("Log directory not found");
        return Ok(TokenSnapshot::from_daily(Vec::new()));
    }

    let cutoff = now - chrono::Duration::days(SCAN_DAYS);
    let files = jsonl_files(dir)?;
    debug!(files = files.len(), "Scanning session logs");

    let mut daily: BTreeMap<String, DailyUsageEntry> = BTreeMap::new();
    let mut seen = HashSet::new();
    for path in &files {
        if let Err(e) = scan_file(path, cutoff, &mut daily, &mut seen) {
            warn!(path = %path.display(), error = %e, "Skipping unreadable log file");
        }
    }

    Ok(TokenSnapshot::from_daily(daily.into_values().collect()))
}

fn jsonl_files(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e.into()),
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }
    }
    Ok(files)
}

fn scan_file(
    path: &Path,
    cutoff: DateTime<Utc>,
    daily: &mut BTreeMap<String, DailyUsageEntry>,
    seen: &mut HashSet<String>,
) -> Result<(), StoreError> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<LogLine>(&line) else {
            continue;
        };
        let Some(timestamp) = entry
            .timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
        else {
            continue;
        };
        if timestamp < cutoff {
            continue;
        }
        let Some(usage) = entry.usage(seen) else {
            continue;
        };

        let date = timestamp.format("%Y-%m-%d").to_string();
        let day = daily
            .entry(date.clone())
            .or_insert_with(|| DailyUsageEntry::new(date));
        add(&mut day.input_tokens, usage.input);
        add(&mut day.output_tokens, usage.output);
        add(&mut day.cache_read_tokens, usage.cache_read);
        add(&mut day.cache_creation_tokens, usage.cache_creation);
        if let Some(cost) = usage.cost_usd {
            day.cost_usd = Some(day.cost_usd.unwrap_or(0.0) + cost);
        }
        if let Some(model) = usage.model {
            if !day.models_used.contains(&model) {
                day.models_used.push(model);
            }
        }
    }
    Ok(())
}

fn add(slot: &mut Option<u64>, value: u64) {
    *slot = Some(slot.unwrap_or(0) + value);
}

// ============================================================================
// Tests
// ============================================================================
