//! A single inbound SMTP session.
//!
//! The session collects an envelope and raw message bytes, then hands
//! the completed message to the registry for fan-out. It never decodes
//! message content; decoding is the receiving client's concern.

use std::{net::SocketAddr, sync::Arc};

use mailtest_common::{Signal, envelope::Envelope, incoming, internal, outgoing};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::broadcast,
};

use crate::{command::Command, registry::Registry};

const TERMINATOR: &[u8] = b"\r\n.\r\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    /// Just connected, greeting not yet acknowledged.
    #[default]
    Connect,
    /// HELO/EHLO done, no transaction open.
    Greeted,
    /// MAIL FROM accepted.
    MailFrom,
    /// At least one RCPT TO accepted.
    RcptTo,
    /// Between the DATA reply and the end-of-data marker.
    Reading,
}

#[derive(Debug, PartialEq, Eq)]
enum Event {
    KeepAlive,
    Close,
}

pub(crate) struct Session<Stream> {
    connection: Stream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    state: State,
    from: String,
    recipients: Vec<String>,
    data: Vec<u8>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub(crate) fn create(connection: Stream, peer: SocketAddr, registry: Arc<Registry>) -> Self {
        Self {
            connection,
            peer,
            registry,
            state: State::default(),
            from: String::default(),
            recipients: Vec::default(),
            data: Vec::default(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> std::io::Result<()> {
        internal!(level = DEBUG, "SMTP connection from {}", self.peer);
        self.send("220 mailtest relay service ready").await?;

        let mut buffer = [0u8; 4096];
        let mut pending = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.send("421 Service shutting down").await?;
                    break;
                }

                read = self.connection.read(&mut buffer) => {
                    let bytes_read = read?;
                    if bytes_read == 0 {
                        // Peer is done writing, so are we.
                        break;
                    }

                    pending.extend_from_slice(&buffer[..bytes_read]);
                    if self.drain(&mut pending).await? == Event::Close {
                        break;
                    }
                }
            }
        }

        internal!(level = DEBUG, "SMTP connection from {} closed", self.peer);
        Ok(())
    }

    /// Process everything actionable in the receive buffer: complete
    /// command lines outside of DATA, the end-of-data marker inside it.
    async fn drain(&mut self, pending: &mut Vec<u8>) -> std::io::Result<Event> {
        loop {
            if self.state == State::Reading {
                self.data.append(pending);

                let Some((end, resume)) = find_terminator(&self.data) else {
                    return Ok(Event::KeepAlive);
                };

                let message = unstuff(&self.data[..end]);
                *pending = self.data.split_off(resume);

                let envelope = Envelope::new(self.from.clone(), self.recipients.clone());
                let queued = self.registry.fan_out(&envelope, &message);

                self.reset_transaction();
                self.send(&format!("250 Ok: queued as {queued}")).await?;
                continue;
            }

            let Some(line_end) = pending.windows(2).position(|window| window == b"\r\n") else {
                return Ok(Event::KeepAlive);
            };

            let line = String::from_utf8_lossy(&pending[..line_end]).into_owned();
            pending.drain(..line_end + 2);

            let command = Command::parse(&line);
            incoming!("{command}");

            let (reply, event) = self.apply(command);
            self.send(&reply).await?;

            if event == Event::Close {
                return Ok(Event::Close);
            }
        }
    }

    /// Transition on one command and produce the reply line.
    fn apply(&mut self, command: Command) -> (String, Event) {
        match (self.state, command) {
            (_, Command::Noop) => ("250 Ok".to_string(), Event::KeepAlive),
            (_, Command::Quit) => ("221 Bye".to_string(), Event::Close),
            (_, Command::Rset) => {
                self.reset_transaction();
                ("250 Ok".to_string(), Event::KeepAlive)
            }
            (_, Command::Helo(id)) => {
                self.reset_transaction();
                self.state = State::Greeted;
                (format!("250 mailtest Hello {id}"), Event::KeepAlive)
            }
            (_, Command::Ehlo(id)) => {
                self.reset_transaction();
                self.state = State::Greeted;
                (format!("250 mailtest Hello {id}"), Event::KeepAlive)
            }
            (State::Greeted, Command::MailFrom(address)) => {
                self.from = address;
                self.state = State::MailFrom;
                ("250 Ok".to_string(), Event::KeepAlive)
            }
            (State::MailFrom | State::RcptTo, Command::RcptTo(address)) => {
                self.recipients.push(address);
                self.state = State::RcptTo;
                ("250 Ok".to_string(), Event::KeepAlive)
            }
            (State::RcptTo, Command::Data) => {
                self.state = State::Reading;
                (
                    "354 End data with <CR><LF>.<CR><LF>".to_string(),
                    Event::KeepAlive,
                )
            }
            (_, Command::Unsupported(verb)) => (
                format!("502 {verb} not implemented"),
                Event::KeepAlive,
            ),
            (_, Command::Invalid(_)) => {
                ("500 Syntax error".to_string(), Event::KeepAlive)
            }
            (_, command) => {
                internal!(level = DEBUG, "out-of-sequence {command} from {}", self.peer);
                ("503 Bad sequence of commands".to_string(), Event::KeepAlive)
            }
        }
    }

    fn reset_transaction(&mut self) {
        if self.state != State::Connect {
            self.state = State::Greeted;
        }
        self.from.clear();
        self.recipients.clear();
        self.data.clear();
    }

    async fn send(&mut self, reply: &str) -> std::io::Result<()> {
        outgoing!("{reply}");
        self.connection.write_all(reply.as_bytes()).await?;
        self.connection.write_all(b"\r\n").await?;
        self.connection.flush().await
    }
}

/// Locate the end-of-data marker. Returns `(message_end, resume_from)`
/// where `message_end` is the length of the message content (with its
/// final CRLF) and `resume_from` is the offset of any pipelined bytes
/// after the marker.
fn find_terminator(data: &[u8]) -> Option<(usize, usize)> {
    // An immediate lone dot means an empty message.
    if data.starts_with(b".\r\n") {
        return Some((0, 3));
    }

    data.windows(TERMINATOR.len())
        .position(|window| window == TERMINATOR)
        .map(|at| (at + 2, at + TERMINATOR.len()))
}

/// Undo SMTP dot-stuffing: any remaining line starting with a dot had
/// one prepended by the sender.
fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut at_line_start = true;

    for &byte in data {
        if at_line_start && byte == b'.' {
            at_line_start = false;
            continue;
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }

    out
}
