//! Deterministic command runner for tests
//!
//! Scripted per command line; records every call so tests can assert that
//! dry-run paths never touch the runner and that adapters build the argv
//! and environment they promise.

use crate::error::{PkgmuxError, Result};
use crate::exec::{CommandOutput, CommandRunner, ExecContext};
use std::collections::HashMap;
use std::sync::Mutex;

/// One invocation observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub extra_env: Vec<(String, String)>,
    pub interactive: bool,
}

impl RecordedCall {
    /// The full command line, for convenient matching in assertions.
    pub fn line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Canned outcome for a scripted command line.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Output {
        stdout: String,
        stderr: String,
        code: i32,
    },
    /// Spawn-level failure, as if the binary did not exist.
    SpawnError(String),
}

impl ScriptedResponse {
    pub fn ok(stdout: &str) -> Self {
        Self::Output {
            stdout: stdout.to_string(),
            stderr: String::new(),
            code: 0,
        }
    }

    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::Output {
            stdout: String::new(),
            stderr: stderr.to_string(),
            code,
        }
    }
}

#[derive(Default)]
struct MockState {
    responses: HashMap<String, ScriptedResponse>,
    calls: Vec<RecordedCall>,
}

/// In-process stand-in for [`SystemRunner`](crate::exec::SystemRunner).
///
/// Unscripted command lines succeed with empty output, so adapters under
/// test only need scripts for the calls the test cares about.
#[derive(Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for an exact command line ("program arg1 arg2").
    pub fn script(&self, line: &str, response: ScriptedResponse) {
        self.state
            .lock()
            .expect("mock runner lock")
            .responses
            .insert(line.to_string(), response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().expect("mock runner lock").calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().expect("mock runner lock").calls.len()
    }

    fn record_and_resolve(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
        interactive: bool,
    ) -> Result<CommandOutput> {
        let call = RecordedCall {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            extra_env: extra_env.to_vec(),
            interactive,
        };
        let line = call.line();

        let response = {
            let mut state = self.state.lock().expect("mock runner lock");
            state.calls.push(call);
            state.responses.get(&line).cloned()
        };

        if ctx.is_cancelled() {
            return Err(PkgmuxError::Interrupted);
        }

        match response {
            None => Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                code: Some(0),
            }),
            Some(ScriptedResponse::Output {
                stdout,
                stderr,
                code,
            }) => {
                if code != 0 {
                    return Err(PkgmuxError::CommandFailed {
                        command: line,
                        code: Some(code),
                        stdout,
                        stderr,
                    });
                }
                Ok(CommandOutput {
                    stdout,
                    stderr,
                    code: Some(code),
                })
            }
            Some(ScriptedResponse::SpawnError(reason)) => {
                Err(PkgmuxError::SpawnFailed {
                    command: line,
                    reason,
                })
            }
        }
    }
}

impl CommandRunner for MockRunner {
    fn run_with_context(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Result<CommandOutput> {
        self.record_and_resolve(ctx, program, args, extra_env, false)
    }

    fn run_interactive(
        &self,
        ctx: &ExecContext,
        program: &str,
        args: &[&str],
        extra_env: &[(String, String)],
    ) -> Result<i32> {
        self.record_and_resolve(ctx, program, args, extra_env, true)
            .map(|out| out.code.unwrap_or(0))
    }
}
