//! The listener-connection endpoint.
//!
//! One port serves two things: a WebSocket upgrade that registers a
//! listener connection (query parameters `id`, `ns`, `mode`), and a
//! bare 200 for any plain HTTP request so a test runner can poll for
//! "server is up".

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::any,
};
use futures_util::{SinkExt, StreamExt};
use mailtest_common::{
    internal,
    namespace::{Namespace, NamespaceMode},
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::registry::Registry;

#[derive(Debug, Deserialize)]
pub(crate) struct ListenerParams {
    id: Option<String>,
    ns: Option<String>,
    mode: Option<String>,
}

pub(crate) fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", any(endpoint))
        // Liveness polls hit arbitrary paths; all of them answer 200.
        .fallback(liveness)
        .with_state(registry)
}

async fn liveness() -> StatusCode {
    StatusCode::OK
}

async fn endpoint(
    upgrade: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
    Query(params): Query<ListenerParams>,
    State(registry): State<Arc<Registry>>,
) -> Response {
    match upgrade {
        Ok(upgrade) => upgrade
            .on_upgrade(move |socket| serve_listener(socket, params, registry))
            .into_response(),
        // Any plain request answers 200, as a liveness signal only.
        Err(_) => StatusCode::OK.into_response(),
    }
}

async fn serve_listener(socket: WebSocket, params: ListenerParams, registry: Arc<Registry>) {
    let id = params
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));
    let mode = params
        .mode
        .and_then(|mode| mode.parse::<NamespaceMode>().ok())
        .unwrap_or_default();
    let namespace = Namespace::new(params.ns.unwrap_or_default(), mode);

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let generation = registry.register(&id, namespace.clone(), tx);
    internal!(level = DEBUG, "listener ({id}) connected [{namespace}]");

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            payload = rx.recv() => {
                let Some(raw) = payload else { break };
                if sink.send(Message::Binary(raw.into())).await.is_err() {
                    break;
                }
            }

            message = stream.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(message)) => {
                        internal!(level = DEBUG, "listener ({id}) sent: {message:?}");
                    }
                }
            }
        }
    }

    // Deregistering discards any pushes still in flight to this
    // connection. The generation token keeps this from removing a
    // replacement that reconnected under the same id.
    registry.deregister(&id, generation);
    let (received, forwarded) = registry.stats();
    internal!(
        level = DEBUG,
        "listener ({id}) disconnected (received: {received}, forwarded: {forwarded})"
    );
}
