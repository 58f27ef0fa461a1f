//! Configuration loading via `ortho-config`.
//!
//! Only the wrapper's own settings live here. The per-job variables
//! (`SCRATCH_SIZE`, `BATCH_FILE_TYPE`, `BATCH_FILE_S3_URL`) are read by
//! [`crate::probe`] because the scheduler sets them without a prefix.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::scratch::{DEFAULT_TEARDOWN_SUBCOMMAND, DEFAULT_VOLUME_TOOL, VolumeToolConfig};

/// Default delegated bootstrap script.
pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = "fetch_and_run.sh";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Wrapper settings derived from defaults, configuration files and
/// environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "ENTRYPOINT")]
pub struct EntrypointConfig {
    /// Volume tool used to create and delete scratch volumes.
    #[ortho_config(default = DEFAULT_VOLUME_TOOL.to_owned())]
    pub volume_tool: String,
    /// Volume tool subcommand that detaches and deletes volumes.
    #[ortho_config(default = DEFAULT_TEARDOWN_SUBCOMMAND.to_owned())]
    pub teardown_subcommand: String,
    /// Script run instead of the user command in delegated bootstrap mode.
    #[ortho_config(default = DEFAULT_BOOTSTRAP_SCRIPT.to_owned())]
    pub bootstrap_script: String,
    /// Tracing verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    #[ortho_config(default = DEFAULT_LOG_LEVEL.to_owned())]
    pub log_level: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str) -> Self {
        Self {
            description,
            env_var,
        }
    }
}

impl EntrypointConfig {
    /// Returns the built-in defaults without consulting any source.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            volume_tool: DEFAULT_VOLUME_TOOL.to_owned(),
            teardown_subcommand: DEFAULT_TEARDOWN_SUBCOMMAND.to_owned(),
            bootstrap_script: DEFAULT_BOOTSTRAP_SCRIPT.to_owned(),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
        }
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or leave it unset to use the default",
                metadata.description, metadata.env_var
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments, which
    /// belong to the wrapped command.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("entrypoint")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.volume_tool,
            &FieldMetadata::new("volume tool", "ENTRYPOINT_VOLUME_TOOL"),
        )?;
        Self::require_field(
            &self.teardown_subcommand,
            &FieldMetadata::new(
                "volume teardown subcommand",
                "ENTRYPOINT_TEARDOWN_SUBCOMMAND",
            ),
        )?;
        Self::require_field(
            &self.bootstrap_script,
            &FieldMetadata::new("bootstrap script", "ENTRYPOINT_BOOTSTRAP_SCRIPT"),
        )?;
        Ok(())
    }

    /// Builds the volume tool settings. Call [`Self::validate`] first.
    #[must_use]
    pub fn volume_tool_config(&self) -> VolumeToolConfig {
        VolumeToolConfig::new(&self.volume_tool, &self.teardown_subcommand)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}
