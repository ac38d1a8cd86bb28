//! In-process relay harness.
//!
//! Starts a full relay on a free SMTP/listener port pair and hands out
//! clients and senders pointed at it. Everything runs in the test
//! process; shutdown goes through the same broadcast signal the binary
//! uses.

use std::{net::Ipv4Addr, time::Duration};

use mailtest_client::{MailClient, MailSender};
use mailtest_common::{Signal, config::Config, namespace::Namespace};
use mailtest_relay::{Relay, error::ServerError};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
};

pub struct TestHarness {
    config: Config,
    shutdown: broadcast::Sender<Signal>,
    relay: JoinHandle<Result<(), ServerError>>,
}

impl TestHarness {
    /// Start a relay on a fresh port pair and wait until both endpoints
    /// accept connections.
    pub async fn start() -> Self {
        let config = Config::new(free_port_pair().await);
        let (shutdown, _) = broadcast::channel(16);

        let relay = Relay::new(config.clone());
        let sender = shutdown.clone();
        let relay = tokio::spawn(async move { relay.serve(sender).await });

        wait_for_port(config.smtp_port()).await;
        wait_for_port(config.listener_port()).await;

        Self {
            config,
            shutdown,
            relay,
        }
    }

    #[allow(dead_code)]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[allow(dead_code)]
    pub const fn smtp_port(&self) -> u16 {
        self.config.smtp_port()
    }

    #[allow(dead_code)]
    pub const fn listener_port(&self) -> u16 {
        self.config.listener_port()
    }

    /// A connected client for `namespace`, with its registration
    /// settled on the relay side.
    pub async fn client(&self, namespace: Namespace) -> MailClient {
        let mut client = MailClient::new(&self.config, namespace);
        client.connect().await.expect("client should connect");
        // The relay registers the connection just after the handshake
        // resolves; give that task a moment to run.
        tokio::time::sleep(Duration::from_millis(50)).await;
        client
    }

    pub fn sender(&self) -> MailSender {
        MailSender::new(&self.config)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(Signal::Shutdown);
        let _ = self.relay.await;
    }
}

/// Find a port `p` where both `p` and `p + 1` are free, since the
/// listener endpoint always sits one above the SMTP port.
async fn free_port_pair() -> u16 {
    loop {
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("should bind an ephemeral port");
        let port = probe
            .local_addr()
            .expect("bound socket should have an address")
            .port();
        if port == u16::MAX {
            continue;
        }
        if TcpListener::bind((Ipv4Addr::LOCALHOST, port + 1)).await.is_ok() {
            return port;
        }
    }
}

async fn wait_for_port(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("port {port} never became reachable");
}
