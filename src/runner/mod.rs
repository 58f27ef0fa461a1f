//! Child process execution with concurrent stdout/stderr draining.
//!
//! Every launch pipes both output streams and hands each one to its own
//! Tokio task before the runner waits on the child. A child that fills one
//! pipe while the other is being read therefore never stalls. The runner
//! offers two flavours through [`CommandRunner`]: a capturing run used for
//! the volume tool, and a streaming run used for the wrapped workload where
//! output is only forwarded.
//!
//! Once the child exits, drainers get [`DRAIN_GRACE_PERIOD`] to reach end of
//! input. Output still arriving after that, typically from a background
//! process that inherited the pipes, is discarded with a warning.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use shell_escape::unix::escape;
use thiserror::Error;
use tokio::io;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

mod drain;

use drain::{DrainOptions, finish_capture};

/// Exit code reported when neither an exit status nor a terminating signal
/// can be recovered from the child.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Base added to a terminating signal number to form an exit code.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// How long drainers may keep reading after the child has exited.
///
/// A background process started by the child can inherit its pipes and keep
/// them open long after the child is gone.
pub const DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Boxed future returned by [`CommandRunner`] implementations.
pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RunnerError>> + Send + 'a>>;

/// Result of a capturing run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionResult {
    /// Normalised exit code; see [`exit_code_from_status`].
    pub code: i32,
    /// Captured standard output, newline-joined, single trailing newline
    /// removed.
    pub stdout: String,
    /// Captured standard error, in the same shape as `stdout`.
    pub stderr: String,
}

impl ExecutionResult {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Errors that leave the runner without a meaningful exit code.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunnerError {
    /// Raised when the child cannot be started at all.
    #[error("failed to start {command}: {message}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when waiting for the child fails and no status is available.
    #[error("failed to determine exit status of {command}: {message}")]
    Wait {
        /// Rendered command line.
        command: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a stream drainer fails or panics.
    #[error("failed to drain {stream} of {command}: {message}")]
    Stream {
        /// Rendered command line.
        command: String,
        /// Which stream failed (`stdout` or `stderr`).
        stream: &'static str,
        /// Underlying failure.
        message: String,
    },
}

/// Abstraction over process execution so tests can script outcomes.
pub trait CommandRunner: Send + Sync {
    /// Runs `program`, forwarding its output live while capturing stdout and
    /// stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the process cannot be started, its exit
    /// status cannot be determined, or a stream cannot be drained.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString])
    -> RunnerFuture<'a, ExecutionResult>;

    /// Runs `program`, forwarding its output live without capturing it, and
    /// returns the normalised exit code.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] under the same conditions as
    /// [`CommandRunner::run`].
    fn run_streaming<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a, i32>;
}

/// Runner that launches real child processes.
///
/// By default every drained line is echoed to this process's own stdout or
/// stderr. [`ProcessCommandRunner::silent`] drains without echoing, which
/// keeps test output readable.
#[derive(Clone, Copy, Debug)]
pub struct ProcessCommandRunner {
    echo: bool,
}

impl Default for ProcessCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCommandRunner {
    /// Creates a runner that forwards child output to the caller's streams.
    #[must_use]
    pub const fn new() -> Self {
        Self { echo: true }
    }

    /// Creates a runner that drains child output without forwarding it.
    #[must_use]
    pub const fn silent() -> Self {
        Self { echo: false }
    }

    async fn execute(
        &self,
        program: &str,
        args: &[OsString],
        capture: bool,
    ) -> Result<ExecutionResult, RunnerError> {
        let command = render_command(program, args);
        info!(%command, "starting process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| RunnerError::Spawn {
                command: command.clone(),
                message: err.to_string(),
            })?;

        // Both drainers must be running before we block on the child.
        let stdout_task = child.stdout.take().map(|pipe| {
            tokio::spawn(drain::drain_lines(
                pipe,
                self.echo.then(io::stdout),
                DrainOptions::new("stdout", capture),
            ))
        });
        let stderr_task = child.stderr.take().map(|pipe| {
            tokio::spawn(drain::drain_lines(
                pipe,
                self.echo.then(io::stderr),
                DrainOptions::new("stderr", capture),
            ))
        });

        let status = child.wait().await.map_err(|err| RunnerError::Wait {
            command: command.clone(),
            message: err.to_string(),
        })?;

        let deadline = Instant::now() + DRAIN_GRACE_PERIOD;
        let stdout = join_drainer(stdout_task, &command, "stdout", deadline).await?;
        let stderr = join_drainer(stderr_task, &command, "stderr", deadline).await?;

        let code = exit_code_from_status(status);
        info!(%command, exit_code = code, "process exited");

        Ok(ExecutionResult {
            code,
            stdout: finish_capture(&stdout),
            stderr: finish_capture(&stderr),
        })
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
    ) -> RunnerFuture<'a, ExecutionResult> {
        Box::pin(self.execute(program, args, true))
    }

    fn run_streaming<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a, i32> {
        Box::pin(async move {
            let result = self.execute(program, args, false).await?;
            Ok(result.code)
        })
    }
}

async fn join_drainer(
    task: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    command: &str,
    stream: &'static str,
    deadline: Instant,
) -> Result<Vec<u8>, RunnerError> {
    let Some(mut handle) = task else {
        debug!(%command, stream, "no pipe attached");
        return Ok(Vec::new());
    };

    let Ok(joined) = timeout_at(deadline, &mut handle).await else {
        handle.abort();
        warn!(
            %command,
            stream,
            "pipe still open after the process exited; discarding remaining output"
        );
        return Ok(Vec::new());
    };

    match joined {
        Ok(Ok(captured)) => Ok(captured),
        Ok(Err(err)) => Err(RunnerError::Stream {
            command: command.to_owned(),
            stream,
            message: err.to_string(),
        }),
        Err(err) => Err(RunnerError::Stream {
            command: command.to_owned(),
            stream,
            message: err.to_string(),
        }),
    }
}

/// Maps a child's termination status to a single exit code.
///
/// A normal exit yields its status code. A child killed by signal `n`
/// yields `128 + n`. Anything else yields [`UNKNOWN_EXIT_CODE`].
#[must_use]
pub fn exit_code_from_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SIGNAL_EXIT_BASE + signal;
        }
    }

    UNKNOWN_EXIT_CODE
}

/// Renders `program` and `args` as a shell-escaped command line for logs and
/// error messages.
#[must_use]
pub fn render_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = escape(program.into()).into_owned();
    for arg in args {
        rendered.push(' ');
        let lossy = arg.to_string_lossy();
        rendered.push_str(escape(lossy).as_ref());
    }
    rendered
}

#[cfg(test)]
mod tests;
