//! Tracing subscriber installation for binaries and tests.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Failure to install the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    /// A global subscriber is already set.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a formatting subscriber filtered by `level`, which accepts any
/// `EnvFilter` directive such as `info` or `microtile::codec=trace`.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(level).map_err(|e| LoggingError::InvalidLevel(e.to_string()))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
