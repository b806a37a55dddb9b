//! Process runner abstraction and the Tokio-backed implementation.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::handle::DumpHandle;
use super::{EXEC_TARGET, ExecError};

/// Result of running an external command to completion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Returns standard output followed by standard error.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) if self.stdout.ends_with('\n') => {
                format!("{}{}", self.stdout, self.stderr)
            }
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Human readable exit status, `unknown` when the process was signalled.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// A fully resolved process invocation: program, arguments and extra
/// environment. No shell is involved in running it.
#[derive(Clone, Eq, PartialEq)]
pub struct Invocation {
    /// Program to execute.
    pub program: String,
    /// Arguments passed verbatim to the program.
    pub args: Vec<OsString>,
    /// Environment variables added to the child's environment.
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    /// Creates an invocation without extra environment.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    /// Adds an environment variable to the child's environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns a shell-like command string for logs and assertions.
    ///
    /// Environment values are never included.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, err: &std::io::Error) -> ExecError {
        ExecError::Spawn {
            program: self.program.clone(),
            message: err.to_string(),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.envs.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env_keys", &env_keys)
            .finish()
    }
}

/// Future returned by [`ProcessRunner::run`].
pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExecError>> + Send + 'a>>;

/// Abstraction over process execution to support fakes in tests.
pub trait ProcessRunner: Send + Sync {
    /// Runs the invocation to completion, capturing stdout and stderr.
    ///
    /// The process is killed when `cancel` fires or the returned future is
    /// dropped before completion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the process cannot be started and
    /// [`ExecError::Canceled`] if `cancel` fires first. A non-zero exit is
    /// not an error at this layer.
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancellationToken,
    ) -> RunnerFuture<'a, CommandOutput>;

    /// Starts the invocation and returns a handle over its standard output.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the process cannot be started.
    fn spawn(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<DumpHandle, ExecError>;
}

/// Real runner that starts host processes through `tokio::process`.
#[derive(Clone, Debug, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancellationToken,
    ) -> RunnerFuture<'a, CommandOutput> {
        Box::pin(async move {
            let child = invocation
                .command()
                .spawn()
                .map_err(|err| invocation.spawn_error(&err))?;
            debug!(
                target: EXEC_TARGET,
                program = %invocation.program,
                pid = child.id(),
                "spawned capture process"
            );

            // Dropping the pending wait kills the child via `kill_on_drop`.
            tokio::select! {
                () = cancel.cancelled() => {
                    warn!(
                        target: EXEC_TARGET,
                        program = %invocation.program,
                        "command cancelled, killing process"
                    );
                    Err(ExecError::Canceled {
                        program: invocation.program.clone(),
                        reason: String::from("cancellation requested"),
                    })
                }
                result = child.wait_with_output() => {
                    let output = result.map_err(|err| ExecError::Io {
                        program: invocation.program.clone(),
                        message: err.to_string(),
                    })?;
                    Ok(CommandOutput {
                        code: output.status.code(),
                        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    })
                }
            }
        })
    }

    fn spawn(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<DumpHandle, ExecError> {
        let child = invocation
            .command()
            .spawn()
            .map_err(|err| invocation.spawn_error(&err))?;
        debug!(
            target: EXEC_TARGET,
            program = %invocation.program,
            pid = child.id(),
            "spawned streaming process"
        );
        DumpHandle::from_child(invocation.program.clone(), child, cancel.clone())
    }
}
