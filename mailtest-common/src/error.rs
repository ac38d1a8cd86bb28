//! Foundational error types shared across the mailtest crates.

use thiserror::Error;

/// Errors raised while reading the process configuration.
///
/// These are fatal at startup; nothing in the system can run without a
/// valid SMTP port.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The required SMTP port environment variable is not set.
    #[error("{0} env var is required to start the test mail server")]
    MissingPort(&'static str),

    /// The SMTP port environment variable is set but not numeric.
    #[error("{0} env var needs to be a number, got '{1}'")]
    InvalidPort(&'static str, String),
}
