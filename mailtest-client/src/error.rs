//! Error types for the mail client.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced to test code.
///
/// A timed-out wait is an ordinary failure naming what was missing;
/// calling code decides whether to retry, fail the test, or report it
/// elsewhere. Nothing here is retried automatically.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not open the listener connection to the relay.
    #[error("Failed to connect to relay: {0}")]
    Connect(#[source] tungstenite::Error),

    /// A caller-specified deadline elapsed with no matching email.
    #[error("No email for {wanted}")]
    NoEmail { wanted: String },

    /// A newer wait for the same recipient displaced this one.
    #[error("Wait for {recipient} was displaced by a newer wait")]
    Replaced { recipient: String },

    /// An address handed to the outbound sender did not parse.
    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The outbound envelope could not be built.
    #[error("Invalid mail envelope: {0}")]
    Envelope(#[from] lettre::error::Error),

    /// The outbound SMTP transaction failed.
    #[error("Failed to send mail: {0}")]
    Send(#[from] lettre::transport::smtp::Error),
}
