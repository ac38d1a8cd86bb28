//! The mail client: buffers pushed messages and resolves pending
//! "wait for this email" requests.
//!
//! All inbox mutation and wait resolution happen on delivery of pushed
//! messages, serialized by the reader task; wait registration takes the
//! same lock briefly. Waits suspend only the calling task, through a
//! oneshot channel per pending wait.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt, future::try_join_all, stream::SplitSink};
use indexmap::IndexMap;
use mailtest_common::{config::Config, email::Email, internal, namespace::Namespace};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing::warn;

use crate::{address, error::ClientError, filter::Filter};

type Sink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

struct RecipientWait {
    token: u64,
    tx: oneshot::Sender<Email>,
}

struct FilterWait {
    token: u64,
    filter: Filter,
    tx: oneshot::Sender<Email>,
}

#[derive(Default)]
struct Inner {
    /// Most recent email per recipient, in arrival order.
    inbox: IndexMap<String, Email>,
    recipient_waits: HashMap<String, RecipientWait>,
    filter_waits: Vec<FilterWait>,
    next_token: u64,
}

impl Inner {
    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Handle one pushed raw message. Each push means "a message
    /// arrived for some recipient of yours"; the decoded email is
    /// stored and announced once per recipient in its `to` list.
    fn deliver(&mut self, raw: &[u8]) {
        let email = Email::decode(raw);
        internal!(level = DEBUG, "you've got mail: {:?}", email.to.first());

        for recipient in email.to.clone() {
            if self.inbox.contains_key(&recipient) {
                warn!("overwriting unconsumed email for {recipient}");
            }
            self.inbox.insert(recipient.clone(), email.clone());

            if let Some(wait) = self.recipient_waits.remove(&recipient) {
                let _ = wait.tx.send(email.clone());
            }

            // Filter waits are independent; resolve every one that
            // matches, in registration order.
            let mut index = 0;
            while index < self.filter_waits.len() {
                if self.filter_waits[index].filter.matches(&email) {
                    let wait = self.filter_waits.remove(index);
                    let _ = wait.tx.send(email.clone());
                } else {
                    index += 1;
                }
            }
        }
    }
}

struct Connection {
    sink: Sink,
    reader: JoinHandle<()>,
}

/// One mail client per test context. Connects to the relay, registers
/// its namespace, and exposes the waiting protocol.
pub struct MailClient {
    id: String,
    namespace: Namespace,
    listener_port: u16,
    inner: Arc<Mutex<Inner>>,
    connection: Option<Connection>,
}

impl MailClient {
    /// A client with a generated connection id.
    #[must_use]
    pub fn new(config: &Config, namespace: Namespace) -> Self {
        Self::with_id(
            format!("{:016x}", rand::random::<u64>()),
            config,
            namespace,
        )
    }

    /// A client with a caller-chosen connection id. The id and the
    /// namespace value travel as query parameters, so keep them to
    /// URL-safe characters.
    #[must_use]
    pub fn with_id(id: impl Into<String>, config: &Config, namespace: Namespace) -> Self {
        Self {
            id: id.into(),
            namespace,
            listener_port: config.listener_port(),
            inner: Arc::default(),
            connection: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// A fresh unique address scoped to this client's namespace.
    #[must_use]
    pub fn generate_address(&self) -> String {
        address::generate(&self.namespace)
    }

    /// Open the listener connection to the relay. Resolves once the
    /// handshake completes. Call once per lifecycle; reconnecting
    /// before a previous disconnect finished is undefined.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let url = format!(
            "ws://127.0.0.1:{}/?id={}&ns={}&mode={}",
            self.listener_port,
            self.id,
            self.namespace.value(),
            self.namespace.mode(),
        );

        let (socket, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(ClientError::Connect)?;
        let (sink, mut stream) = socket.split();

        let inner = Arc::clone(&self.inner);
        let id = self.id.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Binary(raw)) => lock(&inner).deliver(&raw),
                    Ok(Message::Text(raw)) => lock(&inner).deliver(raw.as_bytes()),
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            internal!(level = DEBUG, "reader for ({id}) finished");
        });

        self.connection = Some(Connection { sink, reader });
        internal!(level = DEBUG, "mail client ({}) connected", self.id);
        Ok(())
    }

    /// Close the transport and clear the inbox. Pending waits are left
    /// to their own timeouts; callers are expected to have awaited or
    /// abandoned them.
    pub async fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.sink.send(Message::Close(None)).await;
            let _ = connection.sink.close().await;
            connection.reader.abort();
        }
        lock(&self.inner).inbox.clear();
        internal!(level = DEBUG, "mail client ({}) stopped", self.id);
    }

    /// Wait for an email addressed to exactly `recipient`.
    ///
    /// An already-buffered email is removed and returned immediately.
    /// `None` waits indefinitely. At most one wait per recipient is
    /// outstanding at a time; registering another displaces the first,
    /// which then fails with [`ClientError::Replaced`].
    pub async fn wait_for_email(
        &self,
        recipient: &str,
        timeout: Option<Duration>,
    ) -> Result<Email, ClientError> {
        let (token, rx) = {
            let mut inner = lock(&self.inner);
            if let Some(email) = inner.inbox.shift_remove(recipient) {
                return Ok(email);
            }

            let token = inner.token();
            let (tx, rx) = oneshot::channel();
            if inner
                .recipient_waits
                .insert(recipient.to_string(), RecipientWait { token, tx })
                .is_some()
            {
                warn!("displacing existing wait for {recipient}");
            }
            (token, rx)
        };

        let wanted = recipient.to_string();
        let wait = async move {
            rx.await.map_err(|_| ClientError::Replaced { recipient: wanted })
        };

        match timeout {
            None => wait.await,
            Some(deadline) => match tokio::time::timeout(deadline, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let mut inner = lock(&self.inner);
                    // Only tear down our own registration; a newer wait
                    // may have displaced this one already.
                    if inner
                        .recipient_waits
                        .get(recipient)
                        .is_some_and(|wait| wait.token == token)
                    {
                        inner.recipient_waits.remove(recipient);
                    }
                    Err(ClientError::NoEmail {
                        wanted: recipient.to_string(),
                    })
                }
            },
        }
    }

    /// Wait for one email per recipient, concurrently. Fails as soon
    /// as any single wait fails.
    pub async fn wait_for_emails<I, S>(
        &self,
        recipients: I,
        timeout: Option<Duration>,
    ) -> Result<Vec<Email>, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        try_join_all(
            recipients
                .into_iter()
                .map(|recipient| async move {
                    self.wait_for_email(recipient.as_ref(), timeout).await
                }),
        )
        .await
    }

    /// Wait for the first email matching `filter`, scanning buffered
    /// email first (in arrival order). A buffered match is removed; a
    /// buffered non-match is skipped and stays in the inbox.
    pub async fn get_one(
        &self,
        filter: impl Into<Filter>,
        timeout: Option<Duration>,
    ) -> Result<Email, ClientError> {
        let filter = filter.into();

        let (token, rx) = {
            let mut inner = lock(&self.inner);
            let buffered = inner
                .inbox
                .iter()
                .find(|(_, email)| filter.matches(email))
                .map(|(recipient, _)| recipient.clone());
            if let Some(recipient) = buffered
                && let Some(email) = inner.inbox.shift_remove(&recipient)
            {
                return Ok(email);
            }

            let token = inner.token();
            let (tx, rx) = oneshot::channel();
            inner.filter_waits.push(FilterWait {
                token,
                filter: filter.clone(),
                tx,
            });
            (token, rx)
        };

        let wanted = filter.to_string();
        let wait = async move {
            rx.await.map_err(|_| ClientError::NoEmail {
                wanted: wanted.clone(),
            })
        };

        match timeout {
            None => wait.await,
            Some(deadline) => match tokio::time::timeout(deadline, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    lock(&self.inner)
                        .filter_waits
                        .retain(|wait| wait.token != token);
                    Err(ClientError::NoEmail {
                        wanted: filter.to_string(),
                    })
                }
            },
        }
    }
}

fn lock(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
