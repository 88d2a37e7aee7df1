//! Subprocess execution for CLI tools.
//!
//! Every spawned child is `kill_on_drop`, so abandoning the future (a
//! timeout, or a session reset) terminates the process. PATH lookups run on
//! the blocking pool and resolved paths are remembered.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::ProcessError;

// ============================================================================
// Process Output
// ============================================================================

/// Output from a process execution.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Standard output with ANSI escapes stripped.
    pub stdout: String,
    /// Standard error with ANSI escapes stripped.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
    /// How long the command took to execute.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the stdout if successful, otherwise an error.
    pub fn stdout_if_success(&self) -> Result<&str, ProcessError> {
        if self.success() {
            Ok(&self.stdout)
        } else {
            Err(ProcessError::NonZeroExit {
                code: self.exit_code,
                stderr: self.stderr.clone(),
            })
        }
    }
}

// ============================================================================
// CLI Runner Trait
// ============================================================================

/// Runs CLI tools on behalf of CLI strategies.
#[async_trait]
pub trait CliRunner: Send + Sync {
    /// Returns true if `cmd` resolves on PATH.
    async fn command_exists(&self, cmd: &str) -> bool;

    /// Runs `cmd` with `args`, killing it after `timeout`.
    async fn run(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;

    /// Terminates every command currently running through this runner.
    fn reset_sessions(&self);
}

// ============================================================================
// Process Runner
// ============================================================================

/// `CliRunner` backed by `tokio::process`.
#[derive(Debug)]
pub struct ProcessRunner {
    generation: watch::Sender<u64>,
    resolved: Mutex<HashMap<String, PathBuf>>,
}

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            generation,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Finds the path to a command.
    ///
    /// Misses are not remembered, so a tool installed later is picked up.
    pub async fn which(&self, cmd: &str) -> Option<PathBuf> {
        if let Some(path) = self.cached_path(cmd) {
            return Some(path);
        }
        let name = cmd.to_string();
        let path = tokio::task::spawn_blocking(move || which::which(name).ok())
            .await
            .ok()
            .flatten()?;
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cmd.to_string(), path.clone());
        Some(path)
    }

    fn cached_path(&self, cmd: &str) -> Option<PathBuf> {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(cmd)
            .cloned()
    }

    /// Current reset generation.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn clean(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&strip_ansi_escapes::strip(bytes)).into_owned()
}

#[async_trait]
impl CliRunner for ProcessRunner {
    async fn command_exists(&self, cmd: &str) -> bool {
        self.which(cmd).await.is_some()
    }

    #[instrument(skip(self), fields(cmd = %cmd, timeout = ?timeout))]
    async fn run(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let cmd_path = self.which(cmd).await.ok_or_else(|| {
            debug!(cmd = %cmd, "Command not found");
            ProcessError::NotFound(cmd.to_string())
        })?;

        // Subscribe before spawning so a reset issued mid-run is observed.
        let mut reset = self.generation.subscribe();
        let start = Instant::now();

        let child = Command::new(&cmd_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        debug!(args = ?args, "Running command");

        let output = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    warn!(cmd = %cmd, timeout = ?timeout, "Command timed out");
                    return Err(ProcessError::Timeout(timeout));
                }
            },
            _ = reset.changed() => {
                info!(cmd = %cmd, "Command cancelled by session reset");
                return Err(ProcessError::Cancelled);
            }
        };

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);
        let result = ProcessOutput {
            stdout: clean(&output.stdout),
            stderr: clean(&output.stderr),
            exit_code,
            duration,
        };

        debug!(
            exit_code = exit_code,
            duration = ?duration,
            stdout_len = result.stdout.len(),
            "Command completed"
        );

        Ok(result)
    }

    fn reset_sessions(&self) {
        self.generation.send_modify(|g| *g += 1);
        info!(generation = self.generation(), "CLI sessions reset");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_command_exists() {
        let runner = ProcessRunner::new();
        assert!(runner.command_exists("sh").await);
        assert!(!runner.command_exists("definitely_not_a_real_command_12345").await);
    }

    #[tokio::test]
    async fn test_resolved_paths_are_remembered() {
        let runner = ProcessRunner::new();
        assert!(runner.cached_path("sh").is_none());

        let path = runner.which("sh").await.unwrap();
        assert_eq!(runner.cached_path("sh"), Some(path));

        assert!(runner.which("definitely_not_a_real_command_12345").await.is_none());
        assert!(runner.cached_path("definitely_not_a_real_command_12345").is_none());
    }

    #[test]
    fn test_clean_strips_ansi() {
        assert_eq!(clean(b"\x1b[32m42% left\x1b[0m"), "42% left");
    }

    #[tokio::test]
    async fn test_run_echo() {
        let runner = ProcessRunner::new();
        let output = runner
            .run("echo", &["hello", "world"], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let runner = ProcessRunner::new();
        let result = runner
            .run("not_a_real_command_xyz", &[], Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ProcessError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_timeout_kills() {
        let runner = ProcessRunner::new();
        let result = runner
            .run("sleep", &["5"], Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ProcessError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_reset_cancels_running_command() {
        let runner = Arc::new(ProcessRunner::new());
        let task = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run("sleep", &["5"], Duration::from_secs(10)).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.reset_sessions();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ProcessError::Cancelled)));
        assert_eq!(runner.generation(), 1);
    }
}
