//! Error types for the relay server.

use std::io;

use thiserror::Error;

/// Errors that can take down a relay component.
///
/// Per-connection failures are logged and swallowed inside the accept
/// loops; only listener-level failures surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind a listener to the specified address.
    #[error("Failed to bind listener to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The HTTP/WebSocket endpoint failed.
    #[error("Listener endpoint error: {0}")]
    Http(#[source] io::Error),
}
