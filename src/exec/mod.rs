//! Command execution against local and remote targets.
//!
//! [`Executor`] is the single place that inspects a target's
//! [`ExecutionMode`]. Local commands run as argument vectors without any
//! shell; remote commands are shell-escaped token by token and handed to the
//! `ssh` client as one line.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::target::{ExecutionMode, ServerTarget};

mod handle;
mod process;
mod ssh;

pub use handle::{DIAGNOSTIC_DRAIN_GRACE, DIAGNOSTIC_TAIL_BYTES, DumpHandle};
pub use process::{CommandOutput, Invocation, ProcessRunner, RunnerFuture, TokioProcessRunner};
pub use ssh::{
    DEFAULT_CAPTURE_DEADLINE, DEFAULT_CONNECT_TIMEOUT_SECS, ExecSettings, SSH_TRANSPORT_EXIT_CODE,
    SSHPASS_ENV, expand_tilde, remote_invocation,
};

pub(crate) const EXEC_TARGET: &str = "pgscout::exec";

/// A command expressed as a program and its argument vector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommand {
    program: String,
    args: Vec<String>,
}

impl RemoteCommand {
    /// Starts a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `inner` (program and arguments) as trailing arguments, as
    /// needed by wrappers such as `docker exec <id> ...`.
    #[must_use]
    pub fn then_run(mut self, inner: Self) -> Self {
        self.args.push(inner.program);
        self.args.extend(inner.args);
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Renders the command as one shell line with every token escaped.
    ///
    /// # Examples
    ///
    /// ```
    /// use pgscout::exec::RemoteCommand;
    ///
    /// let command = RemoteCommand::new("psql").args(["-c", "SELECT 1"]);
    /// assert_eq!(command.render_shell_line(), "psql -c 'SELECT 1'");
    /// ```
    #[must_use]
    pub fn render_shell_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|token| shell_escape::unix::escape(Cow::Borrowed(token.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_shell_line())
    }
}

/// Errors raised while executing commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecError {
    /// Raised when a process cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the remote shell could not be reached or rejected the
    /// login.
    #[error("connection to {server} ({destination}) failed: {diagnostic}")]
    ConnectionFailed {
        /// Identifier of the target server.
        server: String,
        /// Address the shell client tried to reach.
        destination: String,
        /// Diagnostic text reported by the shell client.
        diagnostic: String,
    },
    /// Raised when a capture-mode command exits non-zero.
    #[error("{program} exited with status {status_text}: {diagnostic}")]
    ExecutionFailed {
        /// Program that was executed.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Combined output of the failed command.
        diagnostic: String,
    },
    /// Raised at close time when a streaming producer exits non-zero.
    #[error("{program} exited with status {status_text}: {diagnostic}")]
    ProcessExit {
        /// Program that produced the stream.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Tail of the producer's standard error.
        diagnostic: String,
    },
    /// Raised when cancellation or a deadline stops a command.
    #[error("{program} was cancelled: {reason}")]
    Canceled {
        /// Program that was stopped.
        program: String,
        /// What triggered the cancellation.
        reason: String,
    },
    /// Raised when waiting on a process fails.
    #[error("I/O failure while running {program}: {message}")]
    Io {
        /// Program being supervised.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a command cannot be built from the supplied values.
    #[error("invalid {argument}: {reason}")]
    InvalidArgument {
        /// Argument that was rejected.
        argument: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Dispatches commands to local processes or remote shells.
#[derive(Clone, Debug)]
pub struct Executor<R: ProcessRunner> {
    settings: ExecSettings,
    runner: R,
}

impl Executor<TokioProcessRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner(settings: ExecSettings) -> Self {
        Self::new(settings, TokioProcessRunner)
    }
}

impl<R: ProcessRunner> Executor<R> {
    /// Creates an executor using the provided runner.
    ///
    /// Logs a warning when remote host keys are not verified.
    #[must_use]
    pub fn new(settings: ExecSettings, runner: R) -> Self {
        if !settings.strict_host_key_checking {
            warn!(
                target: EXEC_TARGET,
                known_hosts = %settings.known_hosts_file,
                "remote host key verification is disabled; set ssh_strict_host_key_checking to enable it"
            );
        }
        Self { settings, runner }
    }

    /// Returns the executor settings.
    #[must_use]
    pub const fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    /// Returns the underlying runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs `command` on `target` and captures its output.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] when the process cannot start,
    /// [`ExecError::ConnectionFailed`] when the remote shell is unreachable,
    /// [`ExecError::ExecutionFailed`] on any other non-zero exit, and
    /// [`ExecError::Canceled`] when `cancel` fires or the capture deadline
    /// elapses.
    pub async fn run(
        &self,
        target: &ServerTarget,
        command: &RemoteCommand,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, ExecError> {
        let invocation = self.invocation_for(target, command)?;
        debug!(
            target: EXEC_TARGET,
            server = %target.id,
            mode = ?target.execution_mode(),
            command = %command,
            "running command"
        );

        let output = match self.settings.capture_deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.runner.run(&invocation, cancel))
                .await
                .map_err(|_| ExecError::Canceled {
                    program: invocation.program.clone(),
                    reason: format!("deadline of {deadline:?} elapsed"),
                })??,
            None => self.runner.run(&invocation, cancel).await?,
        };
        self.check_output(target, &invocation, command.program(), output)
    }

    /// Starts `command` on `target` and returns a handle over its output.
    ///
    /// Must be called from within a Tokio runtime. The producer's exit status
    /// is reported by [`DumpHandle::close`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] when the process cannot start or
    /// [`ExecError::InvalidArgument`] when the command has no program.
    pub fn stream(
        &self,
        target: &ServerTarget,
        command: &RemoteCommand,
        cancel: &CancellationToken,
    ) -> Result<DumpHandle, ExecError> {
        let invocation = self.invocation_for(target, command)?;
        debug!(
            target: EXEC_TARGET,
            server = %target.id,
            mode = ?target.execution_mode(),
            command = %command,
            "starting stream"
        );
        self.runner.spawn(&invocation, cancel)
    }

    /// Resolves the process invocation that runs `command` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::InvalidArgument`] when the command has no
    /// program.
    pub fn invocation_for(
        &self,
        target: &ServerTarget,
        command: &RemoteCommand,
    ) -> Result<Invocation, ExecError> {
        if command.program.trim().is_empty() {
            return Err(ExecError::InvalidArgument {
                argument: String::from("program"),
                reason: String::from("command has no program"),
            });
        }
        Ok(match target.execution_mode() {
            ExecutionMode::Local => Invocation::new(
                command.program.clone(),
                command.args.iter().map(Into::into).collect(),
            ),
            ExecutionMode::Remote => {
                remote_invocation(&self.settings, target, &command.render_shell_line())
            }
        })
    }

    fn check_output(
        &self,
        target: &ServerTarget,
        invocation: &Invocation,
        program: &str,
        output: CommandOutput,
    ) -> Result<CommandOutput, ExecError> {
        if output.is_success() {
            return Ok(output);
        }

        let diagnostic = output.combined().trim().to_owned();
        let remote = target.execution_mode() == ExecutionMode::Remote;
        if remote
            && output
                .code
                .is_some_and(|code| ssh::is_transport_failure(invocation, &self.settings, code))
        {
            return Err(ExecError::ConnectionFailed {
                server: target.id.clone(),
                destination: target.ssh_destination(),
                diagnostic,
            });
        }

        Err(ExecError::ExecutionFailed {
            program: program.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            diagnostic,
        })
    }
}

#[cfg(test)]
mod tests;
