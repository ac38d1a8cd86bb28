//! The relay server: accepts SMTP submissions and fans each completed
//! message out to every connected listener whose namespace matches a
//! recipient.

pub mod command;
pub mod error;
pub mod registry;

mod session;
mod smtp;
mod ws;

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use mailtest_common::{Signal, config::Config, internal};
use tokio::{net::TcpListener, sync::broadcast};

use crate::{error::ServerError, registry::Registry};

/// One relay process: an SMTP receiver on the configured port and the
/// listener-connection endpoint one port above it. All state lives in
/// the [`Registry`]; nothing survives the process.
pub struct Relay {
    config: Config,
    registry: Arc<Registry>,
}

impl Relay {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
        }
    }

    /// The shared connection registry, exposed for diagnostics.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Serve both endpoints until a shutdown signal arrives.
    pub async fn serve(&self, shutdown: broadcast::Sender<Signal>) -> Result<(), ServerError> {
        let smtp_socket = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.smtp_port()));
        let smtp = smtp::serve(smtp_socket, self.registry(), shutdown.clone());

        let listener_socket =
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.listener_port()));
        let http = serve_listener_endpoint(listener_socket, self.registry(), shutdown);

        tokio::try_join!(smtp, http)?;
        Ok(())
    }
}

async fn serve_listener_endpoint(
    socket: SocketAddr,
    registry: Arc<Registry>,
    shutdown: broadcast::Sender<Signal>,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(socket)
        .await
        .map_err(|source| ServerError::Bind {
            address: socket.to_string(),
            source,
        })?;
    internal!(level = INFO, "listener endpoint on {socket}");

    let mut receiver = shutdown.subscribe();
    axum::serve(listener, ws::router(registry))
        .with_graceful_shutdown(async move {
            let _ = receiver.recv().await;
        })
        .await
        .map_err(ServerError::Http)
}
