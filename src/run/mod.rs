//! Orchestrates one job: provision scratch space, run the workload, tear
//! the space down, and report the workload's exit code.
//!
//! The workload is either the delegated bootstrap script or the user
//! command. Its exit code is preserved through teardown. Teardown is
//! attempted exactly once whenever provisioning succeeded, whatever the
//! workload did. A teardown failure replaces the workload's code with the
//! fatal code.

use std::ffi::OsString;
use std::io::{self, Write};

use thiserror::Error;
use tracing::{error, info};

use crate::config::{ConfigError, EntrypointConfig};
use crate::probe::JobEnvironment;
use crate::runner::{CommandRunner, RunnerError, render_command};
use crate::scratch::{
    ScratchError, ScratchRequest, ScratchVolumes, VolumeHandleSet, VolumeToolConfig,
};

/// Exit code used for every fatal wrapper failure.
pub const FATAL_EXIT_CODE: i32 = 1;

/// Exit code used when no command was supplied.
pub const MISSING_COMMAND_EXIT_CODE: i32 = 1;

/// Message printed when no command was supplied.
pub const USAGE_MESSAGE: &str = "You didn't specify a command! Exiting.";

/// Errors that abort a job with [`FATAL_EXIT_CODE`].
#[derive(Debug, Error)]
pub enum RunError {
    /// Raised when scratch space cannot be provisioned. Nothing was run.
    #[error("failed to provision scratch space: {0}")]
    Provision(#[source] ScratchError),
    /// Raised when the workload cannot be launched.
    #[error("failed to launch workload: {0}")]
    Launch(#[source] RunnerError),
    /// Raised when provisioned volumes cannot be torn down.
    #[error("failed to tear down scratch volumes: {source}")]
    Teardown {
        /// Exit code of the workload that this failure overrides, if it ran.
        discarded_exit_code: Option<i32>,
        /// Underlying volume tool failure.
        #[source]
        source: ScratchError,
    },
}

impl RunError {
    /// Returns the process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

/// What the job runs once scratch space is in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Workload {
    /// The delegated bootstrap script, run without arguments.
    Bootstrap {
        /// Script path or name.
        script: String,
    },
    /// The user-supplied command.
    Command {
        /// Program to run.
        program: String,
        /// Arguments passed to the program.
        args: Vec<OsString>,
    },
    /// No command was supplied and bootstrap mode is off.
    Missing,
}

impl Workload {
    /// Chooses the workload: bootstrap mode wins over `command`.
    #[must_use]
    pub fn select(
        environment: &JobEnvironment,
        bootstrap_script: &str,
        command: &[String],
    ) -> Self {
        if environment.delegated_bootstrap {
            return Self::Bootstrap {
                script: bootstrap_script.to_owned(),
            };
        }

        match command.split_first() {
            Some((program, args)) => Self::Command {
                program: program.clone(),
                args: args.iter().map(OsString::from).collect(),
            },
            None => Self::Missing,
        }
    }
}

/// Executes the job flow using the provided runner.
#[derive(Debug)]
pub struct RunOrchestrator<R: CommandRunner> {
    runner: R,
    volumes: ScratchVolumes<R>,
    bootstrap_script: String,
}

impl<R> RunOrchestrator<R>
where
    R: CommandRunner + Clone,
{
    /// Creates an orchestrator whose workload and volume tool share `runner`.
    #[must_use]
    pub fn new(
        runner: R,
        volumes: VolumeToolConfig,
        bootstrap_script: impl Into<String>,
    ) -> Self {
        Self {
            volumes: ScratchVolumes::new(volumes, runner.clone()),
            runner,
            bootstrap_script: bootstrap_script.into(),
        }
    }

    /// Creates an orchestrator from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is incomplete.
    pub fn from_config(config: &EntrypointConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            runner,
            config.volume_tool_config(),
            config.bootstrap_script.clone(),
        ))
    }

    /// Runs the job and returns the exit code the process should report.
    ///
    /// The workload's exit code is returned even when non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when provisioning fails (nothing is run), when
    /// the workload cannot be launched (after teardown), or when teardown
    /// fails.
    pub async fn execute(
        &self,
        environment: &JobEnvironment,
        command: &[String],
    ) -> Result<i32, RunError> {
        let scratch = match environment.scratch_size {
            Some(size) => Some(
                self.volumes
                    .provision(&ScratchRequest::new(size))
                    .await
                    .map_err(RunError::Provision)?,
            ),
            None => None,
        };

        let workload = Workload::select(environment, &self.bootstrap_script, command);
        let outcome = self.run_workload(&workload).await;

        if let Some(handles) = scratch {
            self.teardown_after(handles, &outcome).await?;
        }

        let code = outcome?;
        if workload != Workload::Missing {
            info!("Exiting with return code {code}.");
        }
        Ok(code)
    }

    async fn run_workload(&self, workload: &Workload) -> Result<i32, RunError> {
        let code = match workload {
            Workload::Bootstrap { script } => {
                info!(%script, "delegating to bootstrap script");
                self.runner.run_streaming(script, &[]).await
            }
            Workload::Command { program, args } => {
                info!(command = %render_command(program, args), "running command");
                self.runner.run_streaming(program, args).await
            }
            Workload::Missing => {
                writeln!(io::stdout(), "{USAGE_MESSAGE}").ok();
                return Ok(MISSING_COMMAND_EXIT_CODE);
            }
        }
        .map_err(RunError::Launch)?;

        info!(exit_code = code, "workload finished");
        Ok(code)
    }

    async fn teardown_after(
        &self,
        handles: VolumeHandleSet,
        outcome: &Result<i32, RunError>,
    ) -> Result<(), RunError> {
        match self.volumes.teardown(handles).await {
            Ok(()) => Ok(()),
            Err(source) => {
                let discarded_exit_code = outcome.as_ref().ok().copied();
                match outcome {
                    Ok(code) => error!(
                        exit_code = code,
                        "teardown failed; discarding workload exit code"
                    ),
                    Err(err) => error!(error = %err, "teardown failed after workload launch failure"),
                }
                Err(RunError::Teardown {
                    discarded_exit_code,
                    source,
                })
            }
        }
    }
}
