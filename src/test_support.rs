//! Test support utilities shared across unit tests.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::exec::{
    CommandOutput, DumpHandle, ExecError, Invocation, ProcessRunner, RunnerFuture,
    TokioProcessRunner,
};

/// Behaviour of a scripted streaming producer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamScript {
    /// Bytes written to standard output.
    pub stdout: String,
    /// Text written to standard error.
    pub stderr: String,
    /// Seconds to sleep before exiting.
    pub linger_secs: u32,
    /// Exit code of the producer.
    pub exit_code: i32,
}

impl StreamScript {
    /// Producer that prints `stdout` and exits with `exit_code`.
    #[must_use]
    pub fn new(stdout: &str, exit_code: i32) -> Self {
        Self {
            stdout: stdout.to_owned(),
            stderr: String::new(),
            linger_secs: 0,
            exit_code,
        }
    }

    /// Adds standard error text.
    #[must_use]
    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_owned();
        self
    }

    /// Keeps the producer alive for `seconds` before it exits.
    #[must_use]
    pub const fn lingering(mut self, seconds: u32) -> Self {
        self.linger_secs = seconds;
        self
    }

    fn invocation(&self) -> Invocation {
        let script = "printf '%s' \"$1\"; printf '%s' \"$2\" >&2; \
                      if [ \"$3\" -gt 0 ]; then sleep \"$3\"; fi; exit \"$4\"";
        Invocation::new(
            "sh",
            vec![
                OsString::from("-c"),
                OsString::from(script),
                OsString::from("sh"),
                OsString::from(&self.stdout),
                OsString::from(&self.stderr),
                OsString::from(self.linger_secs.to_string()),
                OsString::from(self.exit_code.to_string()),
            ],
        )
    }
}

#[derive(Debug, Default)]
struct Script {
    captures: VecDeque<Result<CommandOutput, ExecError>>,
    streams: VecDeque<StreamScript>,
    invocations: Vec<Invocation>,
}

/// Scripted process runner that returns pre-seeded outputs in FIFO order.
///
/// Capture calls pop queued outputs without spawning anything. Stream calls
/// run a small `sh` script that replays the queued [`StreamScript`] so the
/// returned [`DumpHandle`] wraps a real child process.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    /// Returns the recorded invocations rendered as command strings.
    #[must_use]
    pub fn command_strings(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(Invocation::command_string)
            .collect()
    }

    /// Pushes a successful exit with `stdout`.
    pub fn push_stdout(&self, stdout: &str) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: &str) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an arbitrary captured output.
    pub fn push_output(&self, code: Option<i32>, stdout: &str, stderr: &str) {
        self.lock().captures.push_back(Ok(CommandOutput {
            code,
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
        }));
    }

    /// Pushes an error returned instead of an output.
    pub fn push_error(&self, error: ExecError) {
        self.lock().captures.push_back(Err(error));
    }

    /// Queues a streaming producer.
    pub fn push_stream(&self, stream: StreamScript) {
        self.lock().streams.push_back(stream);
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancellationToken,
    ) -> RunnerFuture<'a, CommandOutput> {
        let next = {
            let mut script = self.lock();
            script.invocations.push(invocation.clone());
            script.captures.pop_front()
        };
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(ExecError::Canceled {
                    program: invocation.program.clone(),
                    reason: String::from("cancellation requested"),
                });
            }
            next.unwrap_or_else(|| {
                Err(ExecError::Spawn {
                    program: invocation.program.clone(),
                    message: String::from("no scripted response"),
                })
            })
        })
    }

    fn spawn(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<DumpHandle, ExecError> {
        let next = {
            let mut script = self.lock();
            script.invocations.push(invocation.clone());
            script.streams.pop_front()
        };
        let Some(stream) = next else {
            return Err(ExecError::Spawn {
                program: invocation.program.clone(),
                message: String::from("no scripted stream"),
            });
        };
        TokioProcessRunner.spawn(&stream.invocation(), cancel)
    }
}

/// Output of `docker ps` for one PostgreSQL container and one web container.
pub const CONTAINER_LISTING: &str = "abc123def456\tpg-main\tpostgres:15\tUp 2 hours\t\
0.0.0.0:5432->5432/tcp, :::5432->5432/tcp\tdb.type=postgresql,team=data\t\
2024-03-01 10:15:00 +0000 UTC\n\
fff000111222\tweb\tnginx:1.25\tUp 3 hours\t80/tcp\t\t2024-03-01 09:00:00 +0000 UTC\n";

/// Output of the database listing query with one template row.
pub const DATABASE_LISTING: &str = "mydb|alice|UTF8|10 MB\ntemplate0|postgres|UTF8|8 MB\n";

static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Holds the environment lock and removes the variables it set on drop.
pub struct EnvGuard {
    keys: Vec<String>,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets every pair while holding the global environment lock.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        for (key, value) in pairs {
            // SAFETY: environment mutation is serialised by `ENV_LOCK`.
            unsafe { std::env::set_var(key, value) };
        }
        Self {
            keys: pairs.iter().map(|(key, _)| (*key).to_owned()).collect(),
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            // SAFETY: the lock is still held until `_guard` drops.
            unsafe { std::env::remove_var(key) };
        }
    }
}
