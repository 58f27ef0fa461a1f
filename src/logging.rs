//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Logs go to stderr so the wrapped command's stdout stays clean.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt;

/// Raised when a global subscriber is already installed.
#[derive(Debug, Error)]
#[error("failed to initialise logging: {0}")]
pub struct LoggingError(String);

/// Installs the global subscriber at the given level.
///
/// Unknown level names fall back to `info`.
///
/// # Errors
///
/// Returns [`LoggingError`] when a subscriber has already been installed.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    fmt()
        .with_max_level(parse_level_str(level).unwrap_or(Level::INFO))
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| LoggingError(err.to_string()))
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
