//! Scratch volume provisioning through an external volume tool.
//!
//! Provisioning shells out to `<tool> ebsmount ...`, which creates, attaches
//! and mounts one or two EBS volumes at [`SCRATCH_MOUNT_POINT`] and prints
//! their identifiers. Teardown hands the same identifiers to the tool's
//! detach-and-delete subcommand. Any non-zero exit from the tool is an
//! error.

use std::ffi::OsString;
use std::fmt;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

use crate::runner::{CommandRunner, ExecutionResult, ProcessCommandRunner, RunnerError, render_command};

/// Default volume tool binary name.
pub const DEFAULT_VOLUME_TOOL: &str = "batchit";

/// Default tool subcommand that detaches and deletes volumes.
pub const DEFAULT_TEARDOWN_SUBCOMMAND: &str = "ddv";

/// Tool subcommand that creates and mounts volumes.
pub const PROVISION_SUBCOMMAND: &str = "ebsmount";

/// Mount point for scratch space.
pub const SCRATCH_MOUNT_POINT: &str = "/scratch";

/// Sizes above this are split across two volumes.
pub const VOLUME_SPLIT_THRESHOLD: u64 = 200;

/// Settings for the external volume tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeToolConfig {
    /// Path or name of the tool binary.
    pub tool: String,
    /// Subcommand used to tear volumes down.
    pub teardown_subcommand: String,
}

impl VolumeToolConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// Blank values are rejected earlier by
    /// [`crate::config::EntrypointConfig::validate`].
    #[must_use]
    pub fn new(tool: &str, teardown_subcommand: &str) -> Self {
        Self {
            tool: tool.trim().to_owned(),
            teardown_subcommand: teardown_subcommand.trim().to_owned(),
        }
    }
}

impl Default for VolumeToolConfig {
    fn default() -> Self {
        Self {
            tool: DEFAULT_VOLUME_TOOL.to_owned(),
            teardown_subcommand: DEFAULT_TEARDOWN_SUBCOMMAND.to_owned(),
        }
    }
}

/// One scratch space request, formed once per invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScratchRequest {
    /// Requested size in the tool's size unit (GiB).
    pub size: u64,
    /// Where the tool mounts the space.
    pub mount_point: Utf8PathBuf,
    /// Number of volumes to request.
    pub volume_count: u8,
}

impl ScratchRequest {
    /// Builds a request for `size`, deriving the volume count.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size,
            mount_point: Utf8PathBuf::from(SCRATCH_MOUNT_POINT),
            volume_count: volume_count_for(size),
        }
    }

    fn provision_args(&self) -> Vec<OsString> {
        vec![
            OsString::from(PROVISION_SUBCOMMAND),
            OsString::from("--size"),
            OsString::from(self.size.to_string()),
            OsString::from("--mountpoint"),
            OsString::from(self.mount_point.as_str()),
            OsString::from("-n"),
            OsString::from(self.volume_count.to_string()),
        ]
    }
}

/// Returns 2 when `size` exceeds [`VOLUME_SPLIT_THRESHOLD`], otherwise 1.
#[must_use]
pub const fn volume_count_for(size: u64) -> u8 {
    if size > VOLUME_SPLIT_THRESHOLD { 2 } else { 1 }
}

/// Identifiers of provisioned volumes.
///
/// Never empty. Consumed by value on teardown so the same set cannot be
/// torn down twice.
#[derive(Clone, Debug, Eq, PartialEq)]
#[must_use = "provisioned volumes must be torn down"]
pub struct VolumeHandleSet {
    ids: Vec<String>,
}

impl VolumeHandleSet {
    /// Parses whitespace-delimited identifiers, returning `None` when there
    /// are none.
    pub fn parse(output: &str) -> Option<Self> {
        let ids: Vec<String> = output.split_whitespace().map(str::to_owned).collect();
        if ids.is_empty() {
            None
        } else {
            Some(Self { ids })
        }
    }

    /// Returns the volume identifiers in tool output order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

impl fmt::Display for VolumeHandleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ids.join(" "))
    }
}

/// Errors raised while provisioning or tearing down scratch volumes.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScratchError {
    /// Raised when the provisioning call exits non-zero.
    #[error("{command} exited with status {status}: {stderr}")]
    ProvisionFailed {
        /// Rendered command line.
        command: String,
        /// Exit code reported by the tool.
        status: i32,
        /// Stderr captured from the tool.
        stderr: String,
    },
    /// Raised when provisioning succeeds but reports no volume identifiers.
    #[error("{command} succeeded but reported no volume ids")]
    NoVolumes {
        /// Rendered command line.
        command: String,
    },
    /// Raised when the teardown call exits non-zero.
    #[error("{command} exited with status {status}: {stderr}")]
    TeardownFailed {
        /// Rendered command line.
        command: String,
        /// Exit code reported by the tool.
        status: i32,
        /// Stderr captured from the tool.
        stderr: String,
    },
    /// Raised when the tool cannot be run at all.
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Creates and destroys scratch volumes by shelling out to the volume tool.
#[derive(Clone, Debug)]
pub struct ScratchVolumes<R: CommandRunner> {
    config: VolumeToolConfig,
    runner: R,
}

impl ScratchVolumes<ProcessCommandRunner> {
    /// Creates a manager wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: VolumeToolConfig) -> Self {
        Self::new(config, ProcessCommandRunner::new())
    }
}

impl<R: CommandRunner> ScratchVolumes<R> {
    /// Creates a new manager using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: VolumeToolConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Returns the tool configuration.
    #[must_use]
    pub const fn config(&self) -> &VolumeToolConfig {
        &self.config
    }

    /// Provisions and mounts scratch space.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::ProvisionFailed`] when the tool exits
    /// non-zero, [`ScratchError::NoVolumes`] when it prints no identifiers,
    /// or [`ScratchError::Runner`] when it cannot be run.
    pub async fn provision(&self, request: &ScratchRequest) -> Result<VolumeHandleSet, ScratchError> {
        let args = request.provision_args();
        info!(
            size = request.size,
            volumes = request.volume_count,
            mount_point = %request.mount_point,
            "provisioning scratch space"
        );

        let output = self.runner.run(&self.config.tool, &args).await?;
        let command = render_command(&self.config.tool, &args);
        let stdout = Self::check(output, &command, |status, stderr| {
            ScratchError::ProvisionFailed {
                command: command.clone(),
                status,
                stderr,
            }
        })?;

        let handles =
            VolumeHandleSet::parse(&stdout).ok_or_else(|| ScratchError::NoVolumes { command })?;
        info!(volume_ids = %handles, "scratch space ready");
        Ok(handles)
    }

    /// Detaches and deletes every volume in `handles`.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::TeardownFailed`] when the tool exits non-zero,
    /// or [`ScratchError::Runner`] when it cannot be run.
    pub async fn teardown(&self, handles: VolumeHandleSet) -> Result<(), ScratchError> {
        let mut args = Vec::with_capacity(handles.ids.len() + 1);
        args.push(OsString::from(&self.config.teardown_subcommand));
        args.extend(handles.ids.iter().map(OsString::from));
        info!(volume_ids = %handles, "tearing down scratch volumes");

        let output = self.runner.run(&self.config.tool, &args).await?;
        let command = render_command(&self.config.tool, &args);
        Self::check(output, &command, |status, stderr| {
            ScratchError::TeardownFailed {
                command: command.clone(),
                status,
                stderr,
            }
        })?;

        info!(volume_ids = %handles, "scratch volumes removed");
        Ok(())
    }

    fn check<F>(output: ExecutionResult, command: &str, failure: F) -> Result<String, ScratchError>
    where
        F: FnOnce(i32, String) -> ScratchError,
    {
        if output.is_success() {
            return Ok(output.stdout);
        }
        tracing::error!(%command, exit_code = output.code, "volume tool failed");
        Err(failure(output.code, output.stderr))
    }
}
