//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::probe::EnvSource;
use crate::runner::{CommandRunner, ExecutionResult, RunnerError, RunnerFuture, render_command};

/// Scripted command runner that returns pre-seeded outcomes in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Capturing and streaming runs share one queue.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<ScriptedResponse>,
    invocations: Vec<CommandInvocation>,
}

#[derive(Clone, Debug)]
enum ScriptedResponse {
    Output(ExecutionResult),
    SpawnFailure,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Whether the streaming (non-capturing) flavour was used.
    pub streaming: bool,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
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
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.lock().invocations.clone()
    }

    /// Pushes a successful exit status with no output.
    pub fn push_success(&self) {
        self.push_output(0, "", "");
    }

    /// Pushes a specific exit code with no output.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(code, "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(code, "", "simulated failure");
    }

    /// Pushes a response that fails to start the process.
    pub fn push_spawn_failure(&self) {
        self.lock()
            .responses
            .push_back(ScriptedResponse::SpawnFailure);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(&self, code: i32, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.lock()
            .responses
            .push_back(ScriptedResponse::Output(ExecutionResult {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn respond(
        &self,
        program: &str,
        args: &[OsString],
        streaming: bool,
    ) -> Result<ExecutionResult, RunnerError> {
        let mut state = self.lock();
        state.invocations.push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            streaming,
        });

        match state.responses.pop_front() {
            Some(ScriptedResponse::Output(output)) => Ok(output),
            Some(ScriptedResponse::SpawnFailure) => Err(RunnerError::Spawn {
                command: render_command(program, args),
                message: String::from("simulated spawn failure"),
            }),
            None => Err(RunnerError::Spawn {
                command: render_command(program, args),
                message: String::from("no scripted response available"),
            }),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
    ) -> RunnerFuture<'a, ExecutionResult> {
        Box::pin(async move { self.respond(program, args, false) })
    }

    fn run_streaming<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a, i32> {
        Box::pin(async move { self.respond(program, args, true).map(|output| output.code) })
    }
}

/// In-memory [`EnvSource`] for probe and orchestrator tests.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MapEnv {
    vars: BTreeMap<String, String>,
}

impl MapEnv {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the environment with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_owned(), value.to_owned());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
