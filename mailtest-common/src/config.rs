//! Environment-driven configuration.
//!
//! The relay is configured entirely through the environment: a required
//! SMTP port, from which the listener-connection port is derived, a
//! debug-logging flag, and a pool size for the outbound sender.

use crate::error::ConfigError;

/// Name of the environment variable holding the SMTP port.
pub const SMTP_PORT_VAR: &str = "SMTP_SERVER_PORT";

/// Name of the environment variable enabling debug logging.
pub const DEBUG_VAR: &str = "DEBUG";

/// Name of the environment variable sizing the outbound transport pool.
pub const POOL_SIZE_VAR: &str = "MAILTEST_POOL_MAX_CONNECTIONS";

const DEFAULT_POOL_SIZE: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    smtp_port: u16,
    debug: bool,
    pool_size: u32,
}

impl Config {
    /// Build a configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Fails when the SMTP port variable is missing or non-numeric.
    /// Both are fatal at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = std::env::var(SMTP_PORT_VAR)
            .map_err(|_| ConfigError::MissingPort(SMTP_PORT_VAR))?;
        let smtp_port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(SMTP_PORT_VAR, port.clone()))?;

        let pool_size = std::env::var(POOL_SIZE_VAR)
            .ok()
            .and_then(|size| size.parse::<u32>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_POOL_SIZE);

        Ok(Self {
            smtp_port,
            debug: std::env::var(DEBUG_VAR).is_ok_and(|v| !v.is_empty()),
            pool_size,
        })
    }

    /// Build a configuration directly, bypassing the environment.
    /// Used by the integration harness to run on ephemeral ports.
    #[must_use]
    pub const fn new(smtp_port: u16) -> Self {
        Self {
            smtp_port,
            debug: false,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// The port the SMTP receiver listens on.
    #[must_use]
    pub const fn smtp_port(&self) -> u16 {
        self.smtp_port
    }

    /// The port listener connections (and the health check) use,
    /// always one above the SMTP port.
    #[must_use]
    pub const fn listener_port(&self) -> u16 {
        self.smtp_port + 1
    }

    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// Maximum number of pooled connections for the outbound sender.
    #[must_use]
    pub const fn pool_size(&self) -> u32 {
        self.pool_size
    }
}
