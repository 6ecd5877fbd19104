//! Command runner for external tools
//!
//! Every interaction with `kind` (and `go`, when installing it) goes
//! through [`CommandRunner`]:
//! - Execute a program with arguments
//! - Capture stdout/stderr
//! - Report exit code and pass/fail status
//!
//! The default [`ProcessRunner`] spawns real processes. Tests swap in
//! scripted runners.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::debug;

/// Result of running a command to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl RunResult {
    /// Successful result with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed result with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined, for diagnostics
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Errors starting a command
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to execute command: {0}")]
    ExecutionFailed(String),
}

/// Runs a command and waits for it to finish
///
/// A non-zero exit is reported through [`RunResult::exit_code`], not as an
/// error. Errors are reserved for commands that could not be started.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<RunResult, RunnerError>;
}

/// Runner backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<RunResult, RunnerError> {
        run(program, args).await
    }
}

/// Run a command, capturing its output
pub async fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<RunResult, RunnerError> {
    run_with_env(program, args, &HashMap::new()).await
}

/// Run a command with extra environment variables, capturing its output
pub async fn run_with_env<S: AsRef<str>>(
    program: &str,
    args: &[S],
    env: &HashMap<String, String>,
) -> Result<RunResult, RunnerError> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(program = %program, args = ?args, "Running command");

    let output = Command::new(program)
        .args(&args)
        .envs(env)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => RunnerError::CommandNotFound(program.to_string()),
            _ => RunnerError::ExecutionFailed(format!("{program}: {e}")),
        })?;

    Ok(RunResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    }
}
