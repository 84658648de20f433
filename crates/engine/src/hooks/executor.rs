//! Hook execution engine
//!
//! Runs the post-commit hook as a subprocess with a bounded lifetime.
//!
//! A reader thread drains the merged stdout/stderr pipe and logs every line
//! as it arrives, while the calling thread waits for it against the deadline.
//! When the deadline passes first, the hook's whole process group is killed,
//! including any backgrounded grandchildren still holding the pipe open. The
//! caller then waits a short grace period for the pipe to close and gives up
//! on the reader thread if it does not, so a run never outlives its deadline
//! by more than that grace period.

use super::command::{HookCommand, ZONE_NAME_ENV};
use duct::ReaderHandle;
use std::io::{self, BufRead, BufReader};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use zone_receiver_core::ZoneName;

/// How long to wait for the output pipe to close after killing a hook
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Failure of a single hook invocation
#[derive(Error, Debug)]
pub enum HookError {
    /// The process could not be started
    #[error("Failed to start hook '{program}': {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The deadline passed and the process group was killed
    #[error("Hook '{program}' timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// Program that was killed
        program: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// Reading output or waiting for exit failed
    #[error("Failed to wait for hook '{program}': {source}")]
    Wait {
        /// Program being waited on
        program: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The process ran to completion but reported failure
    #[error("Hook '{program}' exited with {status}")]
    ExitStatus {
        /// Program that failed
        program: String,
        /// Its exit status
        status: ExitStatus,
    },
}

impl HookError {
    /// Whether the hook was killed because it ran past its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Successful result of [`HookRunner::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// No hook is configured; nothing was spawned
    Skipped,
    /// The hook exited successfully
    Completed {
        /// Wall-clock run time
        elapsed: Duration,
    },
}

/// Post-commit hook runner
///
/// Holds the parsed command and timeout for the lifetime of the process.
/// Cheap to share between request handlers.
#[derive(Debug, Clone)]
pub struct HookRunner {
    command: Option<HookCommand>,
    timeout: Duration,
    env_vars: Vec<(String, String)>,
}

impl HookRunner {
    /// Create a runner; `None` disables the hook
    pub fn new(command: Option<HookCommand>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            env_vars: Vec::new(),
        }
    }

    /// Create a runner from a raw command line; a blank line disables the hook
    pub fn from_command_line(command_line: &str, timeout: Duration) -> Self {
        Self::new(HookCommand::parse(command_line), timeout)
    }

    /// Add an environment variable passed to every invocation
    ///
    /// Entries for the zone name variable are ignored; it always carries the
    /// zone being committed.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key != ZONE_NAME_ENV {
            self.env_vars.push((key, value.into()));
        }
        self
    }

    /// The configured command, if any
    pub fn command(&self) -> Option<&HookCommand> {
        self.command.as_ref()
    }

    /// Deadline applied to each invocation
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the hook for `zone`, blocking until it exits or is killed
    #[tracing::instrument(skip_all, fields(zone = %zone))]
    pub fn run(&self, zone: &ZoneName) -> Result<HookOutcome, HookError> {
        let Some(command) = &self.command else {
            tracing::debug!("No post hook configured");
            return Ok(HookOutcome::Skipped);
        };
        let program = command.program().to_string();

        tracing::debug!(
            command = %command,
            timeout_ms = self.timeout.as_millis(),
            "Starting post hook"
        );
        let start = Instant::now();

        let handle = self
            .expression(command, zone)
            .reader()
            .map(Arc::new)
            .map_err(|source| HookError::Spawn {
                program: program.clone(),
                source,
            })?;

        let wait_err = |source: io::Error| HookError::Wait {
            program: program.clone(),
            source,
        };

        let drained = match self.supervise(&handle, zone) {
            Drain::Finished(result) => result,
            Drain::TimedOut => {
                return Err(HookError::Timeout {
                    program,
                    timeout: self.timeout,
                });
            }
            Drain::ReaderLost => {
                return Err(wait_err(io::Error::other("output reader thread panicked")));
            }
        };
        let elapsed = start.elapsed();
        drained.map_err(wait_err)?;

        let status = match handle.try_wait() {
            Ok(Some(output)) => output.status,
            Ok(None) => {
                return Err(wait_err(io::Error::other(
                    "output closed but the process is still running",
                )));
            }
            Err(source) => return Err(wait_err(source)),
        };

        if !status.success() {
            return Err(HookError::ExitStatus { program, status });
        }

        tracing::debug!(elapsed_ms = elapsed.as_millis(), "Post hook completed");
        Ok(HookOutcome::Completed { elapsed })
    }

    fn expression(&self, command: &HookCommand, zone: &ZoneName) -> duct::Expression {
        // Inherits the parent environment; unchecked so the exit status is
        // classified here rather than surfacing as a read error. With duct the
        // innermost `env` wins, so the zone name goes first.
        let mut expression = duct::cmd(command.program(), command.args())
            .stdin_null()
            .stderr_to_stdout()
            .unchecked()
            .env(ZONE_NAME_ENV, zone.as_str());

        for (key, value) in &self.env_vars {
            expression = expression.env(key, value);
        }

        #[cfg(unix)]
        {
            expression = expression.before_spawn(|cmd| {
                use std::os::unix::process::CommandExt;
                cmd.process_group(0);
                Ok(())
            });
        }

        expression
    }

    /// Drain output on a reader thread while this thread enforces the deadline
    fn supervise(&self, handle: &Arc<ReaderHandle>, zone: &ZoneName) -> Drain {
        let (done_tx, done_rx) = mpsc::channel();
        let reader = Arc::clone(handle);
        let reader_zone = zone.clone();

        let spawned = thread::Builder::new()
            .name("hook-output".to_string())
            .spawn(move || {
                // The receiver is gone once the caller has given up on us
                let _ = done_tx.send(drain_output(&reader, &reader_zone));
            });
        if let Err(e) = spawned {
            kill_hook_group(handle);
            let _ = handle.kill();
            return Drain::Finished(Err(e));
        }

        match done_rx.recv_timeout(self.timeout) {
            Ok(result) => return Drain::Finished(result),
            Err(RecvTimeoutError::Disconnected) => return Drain::ReaderLost,
            Err(RecvTimeoutError::Timeout) => {}
        }

        tracing::warn!(
            timeout_ms = self.timeout.as_millis(),
            "Post hook exceeded timeout, killing it"
        );
        // The leader may already have exited while its group lives on
        kill_hook_group(handle);
        if let Err(e) = handle.kill() {
            tracing::debug!(error = %e, "Failed to kill post hook");
        }

        if done_rx.recv_timeout(KILL_GRACE).is_err() {
            tracing::warn!(
                grace_ms = KILL_GRACE.as_millis(),
                "Post hook output still open after kill; abandoning reader"
            );
        }
        Drain::TimedOut
    }
}

/// How the output drain ended
enum Drain {
    /// The pipe closed before the deadline
    Finished(io::Result<()>),
    /// The deadline passed and the hook was killed
    TimedOut,
    /// The reader thread died without reporting
    ReaderLost,
}

/// Forward each line of the hook's output to the log as it arrives
fn drain_output(handle: &ReaderHandle, zone: &ZoneName) -> io::Result<()> {
    let mut reader = BufReader::new(handle);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&line);
        tracing::info!(
            zone = %zone,
            output = %text.trim_end_matches(['\n', '\r']),
            "post hook output"
        );
    }
}

#[cfg(unix)]
fn kill_hook_group(handle: &ReaderHandle) {
    use rustix::process::{Pid, Signal, kill_process_group};

    // The hook leads its own group, so its pid is the group id
    for raw in handle.pids() {
        let Some(pid) = i32::try_from(raw).ok().and_then(Pid::from_raw) else {
            continue;
        };
        if let Err(e) = kill_process_group(pid, Signal::KILL) {
            tracing::debug!(pid = raw, error = %e, "Failed to kill hook process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_hook_group(_handle: &ReaderHandle) {}

/// Run `command_line` once for `zone`
///
/// A blank command line is a successful no-op.
pub fn run_hook(
    command_line: &str,
    timeout: Duration,
    zone: &ZoneName,
) -> Result<HookOutcome, HookError> {
    HookRunner::from_command_line(command_line, timeout).run(zone)
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn zone(name: &str) -> ZoneName {
        ZoneName::new(name).unwrap()
    }

    /// Write a shell script and return the command line that runs it via `sh`
    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        format!("sh {}", path.display())
    }

    #[test]
    fn test_empty_command_is_skipped() {
        let outcome = run_hook("", Duration::from_secs(1), &zone("example.com")).unwrap();
        assert_eq!(outcome, HookOutcome::Skipped);

        let runner = HookRunner::from_command_line("   ", Duration::from_secs(1));
        assert!(runner.command().is_none());
        assert_eq!(runner.run(&zone("example.com")).unwrap(), HookOutcome::Skipped);
    }

    #[test]
    fn test_successful_hook_completes() {
        let outcome = run_hook("true", Duration::from_secs(5), &zone("example.com")).unwrap();
        assert!(matches!(outcome, HookOutcome::Completed { .. }));
    }

    #[test]
    fn test_zone_name_is_injected_into_environment() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("zone.txt");
        let cmd = script(
            temp.path(),
            "hook.sh",
            &format!("printf '%s' \"${ZONE_NAME_ENV}\" > {}", out.display()),
        );

        run_hook(&cmd, Duration::from_secs(5), &zone("example.com")).unwrap();

        assert_eq!(fs::read_to_string(out).unwrap(), "example.com");
    }

    #[test]
    fn test_parent_environment_is_inherited() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("path.txt");
        let cmd = script(
            temp.path(),
            "hook.sh",
            &format!("printf '%s' \"$PATH\" > {}", out.display()),
        );

        run_hook(&cmd, Duration::from_secs(5), &zone("example.com")).unwrap();

        assert_eq!(
            fs::read_to_string(out).unwrap(),
            std::env::var("PATH").unwrap_or_default()
        );
    }

    #[test]
    fn test_extra_env_does_not_override_zone_name() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("env.txt");
        let cmd = script(
            temp.path(),
            "hook.sh",
            &format!(
                "printf '%s %s' \"$RECEIVER_ROLE\" \"${ZONE_NAME_ENV}\" > {}",
                out.display()
            ),
        );
        let runner = HookRunner::from_command_line(&cmd, Duration::from_secs(5))
            .env("RECEIVER_ROLE", "secondary")
            .env(ZONE_NAME_ENV, "spoofed");

        runner.run(&zone("example.net")).unwrap();

        assert_eq!(fs::read_to_string(out).unwrap(), "secondary example.net");
    }

    #[test]
    fn test_zone_name_is_not_passed_as_argument() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("argc.txt");
        let cmd = script(
            temp.path(),
            "hook.sh",
            &format!("printf '%s' \"$#\" > {}", out.display()),
        );

        run_hook(&cmd, Duration::from_secs(5), &zone("example.com")).unwrap();

        assert_eq!(fs::read_to_string(out).unwrap(), "0");
    }

    #[test]
    fn test_timeout_kills_hook() {
        let start = Instant::now();
        let err = run_hook("sleep 5", Duration::from_millis(200), &zone("example.com"))
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    }

    #[test]
    fn test_timeout_kills_grandchildren_holding_output_open() {
        let temp = TempDir::new().unwrap();
        let cmd = script(temp.path(), "slow.sh", "echo started\nsleep 5\necho finished");

        let start = Instant::now();
        let err = run_hook(&cmd, Duration::from_millis(200), &zone("example.com")).unwrap_err();

        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_applies_after_leader_exits() {
        let temp = TempDir::new().unwrap();
        // The leader exits at once; the backgrounded child keeps the pipe open
        let cmd = script(
            temp.path(),
            "detach.sh",
            "echo started\nsleep 30 &\necho parent done",
        );

        let start = Instant::now();
        let err = run_hook(&cmd, Duration::from_millis(200), &zone("example.com")).unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    }

    #[test]
    fn test_env_ignores_zone_name_key() {
        let runner = HookRunner::from_command_line("true", Duration::from_secs(1))
            .env(ZONE_NAME_ENV, "spoofed")
            .env("RECEIVER_ROLE", "secondary");

        assert_eq!(
            runner.env_vars,
            [("RECEIVER_ROLE".to_string(), "secondary".to_string())]
        );
    }

    #[test]
    fn test_spawn_failure_is_classified() {
        let err = run_hook(
            "/nonexistent/zone-reload-hook",
            Duration::from_secs(1),
            &zone("example.com"),
        )
        .unwrap_err();

        assert!(matches!(err, HookError::Spawn { .. }), "got {err}");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_nonzero_exit_is_reported() {
        let err = run_hook("false", Duration::from_secs(5), &zone("example.com")).unwrap_err();

        match err {
            HookError::ExitStatus { program, status } => {
                assert_eq!(program, "false");
                assert!(!status.success());
            }
            other => panic!("expected exit status error, got {other}"),
        }
    }

    #[test]
    fn test_large_merged_output_is_drained() {
        let temp = TempDir::new().unwrap();
        // Well beyond a pipe buffer; would deadlock without concurrent draining
        let cmd = script(
            temp.path(),
            "noisy.sh",
            "i=0\nwhile [ $i -lt 5000 ]; do\n  echo \"stdout line $i\"\n  echo \"stderr line $i\" >&2\n  i=$((i+1))\ndone",
        );

        let outcome = run_hook(&cmd, Duration::from_secs(20), &zone("example.com")).unwrap();

        assert!(matches!(outcome, HookOutcome::Completed { .. }));
    }

    #[test]
    fn test_non_utf8_output_is_tolerated() {
        let temp = TempDir::new().unwrap();
        let cmd = script(temp.path(), "bytes.sh", "printf 'ok \\377\\376\\n'");

        let outcome = run_hook(&cmd, Duration::from_secs(5), &zone("example.com")).unwrap();

        assert!(matches!(outcome, HookOutcome::Completed { .. }));
    }
}
