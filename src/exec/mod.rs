//! Subprocess execution abstraction
//!
//! Every backend adapter goes through [`CommandRunner`], never through
//! `std::process` directly. That single seam is what makes adapters
//! testable: [`MockRunner`] substitutes for [`SystemRunner`] everywhere and
//! unit tests run with zero subprocesses.

mod mock;
mod system;

pub use mock::{MockRunner, RecordedCall, ScriptedResponse};
pub use system::SystemRunner;

use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Default bound on a whole CLI invocation (5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Base environment forced onto every captured invocation so text parsers
/// always see one stable locale, regardless of the user's settings.
pub const BASE_ENV: &[(&str, &str)] = &[("LC_ALL", "C"), ("LANG", "C")];

/// Cancellation flag plus optional deadline, threaded through every
/// operation. Cancelling (Ctrl-C handler, timeout expiry) terminates
/// in-flight subprocesses promptly instead of letting them hang.
#[derive(Clone)]
pub struct ExecContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl ExecContext {
    /// Context with no deadline. Cancellation still works via [`cancel`].
    ///
    /// [`cancel`]: ExecContext::cancel
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
            timeout: None,
        }
    }

    /// Context that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
            timeout: Some(timeout),
        }
    }

    /// Derive a context sharing this one's cancellation flag but with a
    /// tighter deadline (whichever expires first wins).
    pub fn with_deadline_within(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let (deadline, effective) = match self.deadline {
            Some(existing) if existing <= candidate => (existing, self.timeout.unwrap_or(timeout)),
            _ => (candidate, timeout),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
            timeout: Some(effective),
        }
    }

    /// Configured timeout in whole seconds, for error reporting.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout.map(|t| t.as_secs()).unwrap_or(0)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Handle that lets a signal handler cancel this context without
    /// holding the whole context.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::background()
    }
}

/// Captured result of a completed subprocess.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// The execution seam between adapters and the operating system.
///
/// Non-zero exit status surfaces as
/// [`PkgmuxError::CommandFailed`](crate::error::PkgmuxError::CommandFailed)
/// carrying the exit code and captured output, never as a panic; adapter
/// interpreters pattern-match on that variant to classify failures.
pub trait CommandRunner: Send + Sync {
    /// Simple capture call with the default timeout and no extra environment.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.run_with_context(&ExecContext::with_timeout(DEFAULT_TIMEOUT), program, args, &[])
    }

    /// Capture call honoring the caller's context. `extra_env` is merged
    /// over [`BASE_ENV`]; caller-supplied variables win on conflict.
    fn run_with_context(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Result<CommandOutput>;

    /// Run with stdin/stdout/stderr inherited from the calling process so
    /// the tool can prompt. Returns only the exit status.
    fn run_interactive(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Result<i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_never_expires() {
        let ctx = ExecContext::background();
        assert!(!ctx.is_cancelled());
        assert!(!ctx.deadline_expired());
    }

    #[test]
    fn cancel_is_shared_across_clones() {
        let ctx = ExecContext::background();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn derived_deadline_takes_the_tighter_bound() {
        let ctx = ExecContext::with_timeout(Duration::from_secs(3600));
        let derived = ctx.with_deadline_within(Duration::from_millis(0));
        assert!(derived.deadline_expired());
        assert!(!ctx.deadline_expired());
    }

    #[test]
    fn cancel_flag_reaches_the_context() {
        let ctx = ExecContext::background();
        let flag = ctx.cancel_flag();
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }
}
