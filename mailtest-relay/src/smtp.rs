//! The SMTP accept loop.

use std::{net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use mailtest_common::{Signal, internal};
use tokio::{net::TcpListener, sync::broadcast};

use crate::{error::ServerError, registry::Registry, session::Session};

pub(crate) async fn serve(
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
    internal!(level = INFO, "SMTP listening on {socket}");

    let mut receiver = shutdown.subscribe();
    let mut sessions = Vec::default();

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                if matches!(sig, Ok(Signal::Shutdown)) {
                    internal!(level = INFO, "SMTP listener {socket} shutting down, finishing sessions ...");
                    join_all(sessions).await;
                    break;
                }
            }

            connection = listener.accept() => {
                let (stream, peer) = connection.map_err(ServerError::Accept)?;
                let session = Session::create(stream, peer, Arc::clone(&registry));
                let signal = shutdown.subscribe();
                sessions.push(tokio::spawn(async move {
                    if let Err(err) = session.run(signal).await {
                        internal!(level = ERROR, "session error: {err}");
                    }
                }));
            }
        }
    }

    Ok(())
}
