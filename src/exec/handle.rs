//! Streaming handle over a running dump producer.
//!
//! A [`DumpHandle`] owns exactly one child process. Standard output is the
//! data channel exposed through [`AsyncRead`]; standard error is drained on a
//! background task for the life of the stream so the producer never blocks
//! on a full diagnostic pipe. [`DumpHandle::close`] drops the data pipe,
//! reaps the child and reports its exit status.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{EXEC_TARGET, ExecError};

/// Upper bound on retained diagnostic text, in bytes.
pub const DIAGNOSTIC_TAIL_BYTES: usize = 64 * 1024;

/// How long `close` waits for stderr to reach end of file once the producer
/// has exited. Descendants holding stderr open are not waited for.
pub const DIAGNOSTIC_DRAIN_GRACE: Duration = Duration::from_millis(500);

type SharedTail = Arc<Mutex<DiagnosticTail>>;

/// Owned handle over a streaming child process.
#[derive(Debug)]
pub struct DumpHandle {
    program: String,
    child: Child,
    stdout: Option<ChildStdout>,
    drain: Option<JoinHandle<()>>,
    tail: SharedTail,
    cancel: CancellationToken,
    bytes_read: u64,
}

enum Termination {
    Exited(io::Result<ExitStatus>),
    Canceled,
}

impl DumpHandle {
    /// Wraps a freshly spawned child whose stdout and stderr are piped.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Io`] when the child was spawned without a piped
    /// standard output.
    pub fn from_child(
        program: String,
        mut child: Child,
        cancel: CancellationToken,
    ) -> Result<Self, ExecError> {
        let Some(stdout) = child.stdout.take() else {
            return Err(ExecError::Io {
                program,
                message: String::from("standard output was not captured"),
            });
        };
        let tail = Arc::new(Mutex::new(DiagnosticTail::new(DIAGNOSTIC_TAIL_BYTES)));
        let drain = child
            .stderr
            .take()
            .map(|stderr| drain_diagnostics(program.clone(), stderr, Arc::clone(&tail)));
        Ok(Self {
            program,
            child,
            stdout: Some(stdout),
            drain,
            tail,
            cancel,
            bytes_read: 0,
        })
    }

    /// Program that produces the stream.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Number of bytes read from the data channel so far.
    #[must_use]
    pub const fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Token that aborts the producer when cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Closes the data pipe, waits for the producer and reports its status.
    ///
    /// Closing before the stream reaches its natural end is legal; the child
    /// is still reaped and its exit status still reported.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::ProcessExit`] when the producer exits non-zero or
    /// is terminated by a signal, [`ExecError::Canceled`] when the handle's
    /// cancellation token fires before the producer exits, and
    /// [`ExecError::Io`] when waiting on the child fails.
    pub async fn close(mut self) -> Result<u64, ExecError> {
        drop(self.stdout.take());

        let termination = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Termination::Canceled,
            status = self.child.wait() => Termination::Exited(status),
        };

        match termination {
            Termination::Canceled => {
                warn!(
                    target: EXEC_TARGET,
                    program = %self.program,
                    bytes = self.bytes_read,
                    "dump cancelled, killing producer"
                );
                if let Err(err) = self.child.kill().await {
                    debug!(target: EXEC_TARGET, error = %err, "producer already exited");
                }
                if let Some(task) = self.drain.take() {
                    task.abort();
                }
                Err(ExecError::Canceled {
                    program: self.program,
                    reason: String::from("cancellation requested"),
                })
            }
            Termination::Exited(Err(err)) => Err(ExecError::Io {
                program: self.program,
                message: err.to_string(),
            }),
            Termination::Exited(Ok(status)) => {
                if let Some(mut task) = self.drain.take()
                    && tokio::time::timeout(DIAGNOSTIC_DRAIN_GRACE, &mut task)
                        .await
                        .is_err()
                {
                    debug!(
                        target: EXEC_TARGET,
                        program = %self.program,
                        "stderr still open after exit, keeping partial diagnostics"
                    );
                    task.abort();
                }
                let diagnostic = self
                    .tail
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .text();
                if status.success() {
                    debug!(
                        target: EXEC_TARGET,
                        program = %self.program,
                        bytes = self.bytes_read,
                        "producer exited cleanly"
                    );
                    return Ok(self.bytes_read);
                }
                let status_text = status
                    .code()
                    .map_or_else(|| status.to_string(), |code| code.to_string());
                Err(ExecError::ProcessExit {
                    program: self.program,
                    status: status.code(),
                    status_text,
                    diagnostic,
                })
            }
        }
    }
}

impl AsyncRead for DumpHandle {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(stdout) = this.stdout.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let before = buf.filled().len();
        let poll = Pin::new(stdout).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read = buf.filled().len().saturating_sub(before);
            this.bytes_read = this
                .bytes_read
                .saturating_add(u64::try_from(read).unwrap_or(u64::MAX));
        }
        poll
    }
}

fn drain_diagnostics(program: String, stderr: ChildStderr, tail: SharedTail) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let trimmed = text.trim_end();
                    debug!(target: EXEC_TARGET, program = %program, line = trimmed, "stderr");
                    tail.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(trimmed);
                }
                Err(err) => {
                    debug!(target: EXEC_TARGET, program = %program, error = %err, "stderr drain stopped");
                    break;
                }
            }
        }
    })
}

/// Bounded buffer keeping the most recent diagnostic lines.
#[derive(Debug)]
pub(crate) struct DiagnosticTail {
    lines: VecDeque<String>,
    bytes: usize,
    budget: usize,
}

impl DiagnosticTail {
    pub(crate) const fn new(budget: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            budget,
        }
    }

    pub(crate) fn push(&mut self, line: &str) {
        let kept = keep_suffix(line, self.budget);
        self.bytes = self.bytes.saturating_add(kept.len().saturating_add(1));
        self.lines.push_back(kept.to_owned());
        while self.bytes > self.budget && self.lines.len() > 1 {
            if let Some(dropped) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(dropped.len().saturating_add(1));
            }
        }
    }

    pub(crate) fn text(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn keep_suffix(line: &str, budget: usize) -> &str {
    if line.len() <= budget {
        return line;
    }
    let excess = line.len().saturating_sub(budget);
    line.char_indices()
        .map(|(index, _)| index)
        .find(|index| *index >= excess)
        .and_then(|index| line.get(index..))
        .unwrap_or_default()
}
