//! Fetch pipeline for executing strategies in declared order.
//!
//! The pipeline tries each strategy exactly once, stopping at the first
//! success. Unavailable strategies and failures are both recorded as
//! attempts and the pipeline moves on.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::context::FetchContext;
use crate::error::FetchError;
use crate::strategy::{FetchKind, FetchResult, FetchStrategy};

// ============================================================================
// Fetch Attempt
// ============================================================================

/// Record of a single strategy invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchAttempt {
    /// The strategy ID that was attempted.
    pub strategy_id: String,
    /// The kind of fetch used.
    pub kind: FetchKind,
    /// False if the strategy reported itself unavailable.
    pub was_available: bool,
    /// Error if the attempt did not produce data.
    pub error_description: Option<String>,
    /// How long the attempt took.
    pub duration: Duration,
    /// When the attempt started.
    pub attempted_at: DateTime<Utc>,
}

impl FetchAttempt {
    /// Creates a successful attempt record.
    pub fn success(strategy_id: impl Into<String>, kind: FetchKind, duration: Duration) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            kind,
            was_available: true,
            error_description: None,
            duration,
            attempted_at: Utc::now(),
        }
    }

    /// Creates a record for a strategy that could not run.
    pub fn unavailable(
        strategy_id: impl Into<String>,
        kind: FetchKind,
        reason: Option<String>,
        duration: Duration,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            kind,
            was_available: false,
            error_description: reason,
            duration,
            attempted_at: Utc::now(),
        }
    }

    /// Creates a failed attempt record.
    pub fn failure(
        strategy_id: impl Into<String>,
        kind: FetchKind,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            kind,
            was_available: true,
            error_description: Some(error.into()),
            duration,
            attempted_at: Utc::now(),
        }
    }

    /// Returns true if this attempt produced data.
    pub fn is_success(&self) -> bool {
        self.was_available && self.error_description.is_none()
    }

    /// One-line summary, e.g. `claude.oauth (oauth) available error=HTTP 401`.
    pub fn diagnostic_line(&self) -> String {
        let availability = if self.was_available {
            "available"
        } else {
            "unavailable"
        };
        let mut line = format!("{} ({}) {availability}", self.strategy_id, self.kind.label());
        if let Some(error) = &self.error_description {
            line.push_str(" error=");
            line.push_str(error);
        }
        line
    }
}

// ============================================================================
// Fetch Outcome
// ============================================================================

/// The outcome of a pipeline execution.
#[derive(Debug)]
pub struct FetchOutcome {
    /// The result (success or exhaustion).
    pub result: Result<FetchResult, FetchError>,
    /// One record per strategy invoked, in call order.
    pub attempts: Vec<FetchAttempt>,
    /// Total duration of all attempts.
    pub duration: Duration,
}

impl FetchOutcome {
    /// Returns true if the fetch succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns the successful strategy ID, if any.
    pub fn successful_strategy(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|r| r.strategy_id.as_str())
    }
}

// ============================================================================
// Fetch Pipeline
// ============================================================================

/// An ordered list of strategies for one provider.
///
/// The order is the provider's declared preference and is never re-sorted.
#[derive(Default)]
pub struct FetchPipeline {
    strategies: Vec<Box<dyn FetchStrategy>>,
    disabled_reason: Option<String>,
}

impl FetchPipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline with the given strategies, in order.
    pub fn with_strategies(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self {
            strategies,
            disabled_reason: None,
        }
    }

    /// Creates an empty pipeline that reports why nothing can run.
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            strategies: Vec::new(),
            disabled_reason: Some(reason.into()),
        }
    }

    /// Appends a strategy.
    pub fn push(&mut self, strategy: Box<dyn FetchStrategy>) {
        self.strategies.push(strategy);
    }

    /// Returns the number of strategies in the pipeline.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy IDs in execution order.
    pub fn strategy_ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    /// Runs the strategies in order until one succeeds.
    #[instrument(skip(self, ctx), fields(strategies = self.strategies.len()))]
    pub async fn execute(&self, ctx: &FetchContext) -> FetchOutcome {
        let start = Instant::now();
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut last_error = self.disabled_reason.clone();

        if self.strategies.is_empty() {
            debug!(reason = ?last_error, "No eligible strategies");
            return FetchOutcome {
                result: Err(FetchError::AllStrategiesExhausted {
                    last_error: last_error.or_else(|| Some("no eligible strategies".to_string())),
                }),
                attempts,
                duration: start.elapsed(),
            };
        }

        info!(count = self.strategies.len(), "Executing fetch pipeline");

        for strategy in &self.strategies {
            let strategy_id = strategy.id();
            let kind = strategy.kind();
            let attempt_start = Instant::now();

            debug!(strategy = %strategy_id, kind = %kind, "Checking strategy availability");

            if !strategy.is_available(ctx).await {
                debug!(strategy = %strategy_id, "Strategy not available, skipping");
                attempts.push(FetchAttempt::unavailable(
                    strategy_id,
                    kind,
                    None,
                    attempt_start.elapsed(),
                ));
                continue;
            }

            let timeout = ctx.strategy_timeout(strategy.timeout());
            let result = match tokio::time::timeout(timeout, strategy.fetch(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(timeout)),
            };
            let duration = attempt_start.elapsed();

            match result {
                Ok(result) => {
                    info!(strategy = %strategy_id, duration = ?duration, "Strategy succeeded");
                    attempts.push(FetchAttempt::success(strategy_id, kind, duration));
                    return FetchOutcome {
                        result: Ok(result),
                        attempts,
                        duration: start.elapsed(),
                    };
                }
                Err(error) if error.is_unavailable() => {
                    debug!(strategy = %strategy_id, reason = %error, "Strategy credential unavailable");
                    attempts.push(FetchAttempt::unavailable(
                        strategy_id,
                        kind,
                        Some(error.to_string()),
                        duration,
                    ));
                }
                Err(error) => {
                    warn!(
                        strategy = %strategy_id,
                        error = %error,
                        duration = ?duration,
                        "Strategy failed"
                    );
                    let description = error.to_string();
                    attempts.push(FetchAttempt::failure(
                        strategy_id,
                        kind,
                        description.clone(),
                        duration,
                    ));
                    last_error = Some(description);
                }
            }
        }

        warn!(attempts = attempts.len(), "All strategies exhausted");
        FetchOutcome {
            result: Err(FetchError::AllStrategiesExhausted { last_error }),
            attempts,
            duration: start.elapsed(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
