//! Real subprocess runner

use crate::error::{PkgmuxError, Result};
use crate::exec::{BASE_ENV, CommandOutput, CommandRunner, ExecContext};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

/// Poll interval while waiting on a child process.
const WAIT_TICK: Duration = Duration::from_millis(50);

/// Executes commands against the operating system.
///
/// Stateless: one instance is shared across all backend adapters and all
/// fan-out threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Command {
        let mut cmd = Command::new(program);
        cmd.args(args);
        for (key, value) in BASE_ENV {
            cmd.env(key, value);
        }
        // Caller-supplied variables override the locale base.
        for (key, value) in extra_env {
            cmd.env(key, value);
        }
        cmd
    }

    fn describe(program: &str, args: &[&str]) -> String {
        if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        }
    }

    /// Wait on `child` until it exits, the context is cancelled, or the
    /// deadline passes. Kills the child in the latter two cases.
    fn wait_with_context(
        ctx: &ExecContext,
        child: &mut Child,
        command: &str,
    ) -> Result<std::process::ExitStatus> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if ctx.is_cancelled() {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PkgmuxError::Interrupted);
                    }
                    if ctx.deadline_expired() {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PkgmuxError::Timeout {
                            command: command.to_string(),
                            seconds: ctx.timeout_secs(),
                        });
                    }
                    thread::sleep(WAIT_TICK);
                }
                Err(e) => {
                    return Err(PkgmuxError::SpawnFailed {
                        command: command.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run_with_context(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Result<CommandOutput> {
        let command = Self::describe(program, args);
        let mut cmd = Self::build_command(program, args, extra_env);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| PkgmuxError::SpawnFailed {
            command: command.clone(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| PkgmuxError::SpawnFailed {
            command: command.clone(),
            reason: "Failed to capture stdout".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| PkgmuxError::SpawnFailed {
            command: command.clone(),
            reason: "Failed to capture stderr".to_string(),
        })?;

        // Drain pipes on separate threads so a chatty child never fills a
        // pipe buffer and deadlocks against our wait loop.
        let stdout_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::BufReader::new(stdout).read_to_end(&mut buf);
            buf
        });
        let stderr_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = std::io::BufReader::new(stderr).read_to_end(&mut buf);
            buf
        });

        let status = match Self::wait_with_context(ctx, &mut child, &command) {
            Ok(status) => status,
            Err(e) => {
                let _ = stdout_thread.join();
                let _ = stderr_thread.join();
                return Err(e);
            }
        };

        let stdout = String::from_utf8_lossy(&stdout_thread.join().unwrap_or_default()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_thread.join().unwrap_or_default()).into_owned();
        let code = status.code();

        if !status.success() {
            return Err(PkgmuxError::CommandFailed {
                command,
                code,
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            code,
        })
    }

    fn run_interactive(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Result<i32> {
        let command = Self::describe(program, args);
        let mut cmd = Self::build_command(program, args, extra_env);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| PkgmuxError::SpawnFailed {
            command: command.clone(),
            reason: e.to_string(),
        })?;

        let status = Self::wait_with_context(ctx, &mut child, &command)?;
        let code = status.code().unwrap_or(-1);

        if !status.success() {
            return Err(PkgmuxError::CommandFailed {
                command,
                code: status.code(),
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::DEFAULT_TIMEOUT;

    #[test]
    fn captures_stdout_of_successful_command() {
        let runner = SystemRunner::new();
        let out = runner.run("echo", &["hello"]).expect("echo should succeed");
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.code, Some(0));
    }

    #[test]
    fn nonzero_exit_becomes_command_failed() {
        let runner = SystemRunner::new();
        let err = runner.run("false", &[]).expect_err("false exits nonzero");
        match err {
            PkgmuxError::CommandFailed { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_binary_is_spawn_failure_not_panic() {
        let runner = SystemRunner::new();
        let err = runner
            .run("pkgmux-definitely-not-a-real-binary", &[])
            .expect_err("spawn must fail");
        assert!(matches!(err, PkgmuxError::SpawnFailed { .. }));
    }

    #[test]
    fn base_env_forces_stable_locale() {
        let runner = SystemRunner::new();
        let out = runner
            .run("sh", &["-c", "echo $LC_ALL"])
            .expect("sh should succeed");
        assert_eq!(out.stdout.trim(), "C");
    }

    #[test]
    fn extra_env_overrides_base() {
        let runner = SystemRunner::new();
        let ctx = ExecContext::with_timeout(DEFAULT_TIMEOUT);
        let out = runner
            .run_with_context(
                &ctx,
                "sh",
                &["-c", "echo $LANG"],
                &[("LANG".to_string(), "C.UTF-8".to_string())],
            )
            .expect("sh should succeed");
        assert_eq!(out.stdout.trim(), "C.UTF-8");
    }

    #[test]
    fn deadline_kills_long_running_child() {
        let runner = SystemRunner::new();
        let ctx = ExecContext::with_timeout(Duration::from_millis(200));
        let err = runner
            .run_with_context(&ctx, "sleep", &["10"], &[])
            .expect_err("sleep must be killed");
        assert!(matches!(err, PkgmuxError::Timeout { .. }));
    }

    #[test]
    fn cancellation_kills_child_promptly() {
        let runner = SystemRunner::new();
        let ctx = ExecContext::background();
        let flag = ctx.cancel_flag();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let start = std::time::Instant::now();
        let err = runner
            .run_with_context(&ctx, "sleep", &["10"], &[])
            .expect_err("sleep must be interrupted");
        canceller.join().unwrap();

        assert!(matches!(err, PkgmuxError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
