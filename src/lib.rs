//! Core library for the batch job entrypoint.
//!
//! The entrypoint wraps a container's real workload. Before running it, the
//! wrapper optionally provisions scratch space through an external volume
//! tool; afterwards it tears that space down again and exits with the
//! workload's own exit code (provision → run → teardown).

pub mod config;
pub mod logging;
pub mod probe;
pub mod run;
pub mod runner;
pub mod scratch;
pub mod test_support;

pub use config::{ConfigError, EntrypointConfig};
pub use logging::{LoggingError, init_logging};
pub use probe::{EnvProbe, EnvSource, JobEnvironment, ProcessEnv};
pub use run::{FATAL_EXIT_CODE, RunError, RunOrchestrator, USAGE_MESSAGE, Workload};
pub use runner::{CommandRunner, ExecutionResult, ProcessCommandRunner, RunnerError};
pub use scratch::{
    ScratchError, ScratchRequest, ScratchVolumes, VolumeHandleSet, VolumeToolConfig,
};
