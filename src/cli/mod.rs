//! Command-line interface definitions for the `entrypoint` binary.
//!
//! This module centralises the clap parser structure so both the main binary
//! and the build script can reuse it when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `entrypoint` binary.
#[derive(Debug, Parser)]
#[command(
    name = "entrypoint",
    about = "Provision scratch space, run a batch job command, and tear the space down",
    long_about = "Runs COMMAND with its arguments, passing its output and exit code \
                  through. When SCRATCH_SIZE is set, scratch volumes are mounted at \
                  /scratch before the command starts and removed after it exits. When \
                  BATCH_FILE_TYPE and BATCH_FILE_S3_URL are both set, the bootstrap \
                  script runs instead of COMMAND.",
    disable_version_flag = true
)]
pub(crate) struct Cli {
    /// Command to run, followed by its arguments (passed through verbatim).
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub(crate) command: Vec<String>,
}
