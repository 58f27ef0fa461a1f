//! Job environment probing.
//!
//! The batch scheduler communicates per-job options through plain
//! environment variables. The probe reads them through an [`EnvSource`] so
//! the orchestrator can be exercised against an in-memory environment.

use tracing::warn;

/// Requested scratch size; unset or malformed means no scratch space.
pub const SCRATCH_SIZE_ENV: &str = "SCRATCH_SIZE";

/// Archive type for delegated bootstrap runs.
pub const BATCH_FILE_TYPE_ENV: &str = "BATCH_FILE_TYPE";

/// Archive location for delegated bootstrap runs.
pub const BATCH_FILE_S3_URL_ENV: &str = "BATCH_FILE_S3_URL";

/// Read-only view of environment variables.
pub trait EnvSource {
    /// Returns the value of `name`, or `None` when it is not set.
    fn var(&self, name: &str) -> Option<String>;
}

/// [`EnvSource`] backed by the current process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
    }
}

/// Options derived from the job environment.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct JobEnvironment {
    /// Scratch size to provision, if requested.
    pub scratch_size: Option<u64>,
    /// Whether the delegated bootstrap script replaces the user command.
    pub delegated_bootstrap: bool,
}

/// Reads job options from an [`EnvSource`].
#[derive(Clone, Debug)]
pub struct EnvProbe<E> {
    source: E,
}

impl EnvProbe<ProcessEnv> {
    /// Creates a probe over the current process environment.
    #[must_use]
    pub const fn from_process() -> Self {
        Self::new(ProcessEnv)
    }
}

impl<E: EnvSource> EnvProbe<E> {
    /// Creates a probe over the given source.
    #[must_use]
    pub const fn new(source: E) -> Self {
        Self { source }
    }

    /// Looks up `name`, falling back to `default` when it is unset.
    ///
    /// With `must_be_number`, a non-empty value that is not a base-10
    /// integer is reported as a warning and resolved to the empty string,
    /// which callers treat as "not requested".
    #[must_use]
    pub fn read(&self, name: &str, default: &str, must_be_number: bool) -> String {
        let value = self
            .source
            .var(name)
            .unwrap_or_else(|| default.to_owned());

        if must_be_number && !value.is_empty() && value.parse::<i64>().is_err() {
            warn!(
                variable = name,
                value = %value,
                "ignoring non-numeric value"
            );
            return String::new();
        }

        value
    }

    /// Returns the requested scratch size, if any.
    ///
    /// Negative sizes parse as integers but are ignored with a warning.
    #[must_use]
    pub fn scratch_size(&self) -> Option<u64> {
        let raw = self.read(SCRATCH_SIZE_ENV, "", true);
        if raw.is_empty() {
            return None;
        }

        match raw.parse::<u64>() {
            Ok(size) => Some(size),
            Err(_) => {
                warn!(
                    variable = SCRATCH_SIZE_ENV,
                    value = %raw,
                    "ignoring negative scratch size"
                );
                None
            }
        }
    }

    /// Returns `true` only when both bootstrap variables are non-empty.
    #[must_use]
    pub fn wants_delegated_bootstrap(&self) -> bool {
        [BATCH_FILE_TYPE_ENV, BATCH_FILE_S3_URL_ENV]
            .iter()
            .all(|name| !self.read(name, "", false).is_empty())
    }

    /// Collects every job option in one pass.
    #[must_use]
    pub fn job_environment(&self) -> JobEnvironment {
        JobEnvironment {
            scratch_size: self.scratch_size(),
            delegated_bootstrap: self.wants_delegated_bootstrap(),
        }
    }
}
