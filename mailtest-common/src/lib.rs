pub mod config;
pub mod email;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod namespace;

pub use tracing;

/// Reserved header marker for attaching arbitrary key/value metadata
/// to a test email. Matched case-insensitively.
pub const PROP_HEADER_PREFIX: &str = "x-mailtest-prop-";

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
