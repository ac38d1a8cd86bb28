//! The listener-connection registry and the fan-out loop.
//!
//! The registry is the only state shared between the SMTP side and the
//! listener-connection side. Fan-out takes a read lock, registration
//! and deregistration take the write lock, so a connection closing mid
//! fan-out is either still present (and its closed channel is skipped)
//! or already gone.

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use mailtest_common::{envelope::Envelope, internal, namespace::Namespace};
use tokio::sync::mpsc;

/// One registered listener connection.
#[derive(Debug)]
struct Connection {
    generation: u64,
    namespace: Namespace,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Counters are diagnostics only; they guarantee nothing.
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<String, Connection>>,
    generation: AtomicU64,
    received: AtomicU64,
    forwarded: AtomicU64,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener connection. A reconnect under the same id
    /// displaces the stale registration. Returns a generation token the
    /// connection must present when deregistering, so the displaced
    /// connection's cleanup cannot remove its replacement.
    pub fn register(
        &self,
        id: &str,
        namespace: Namespace,
        tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if connections
            .insert(
                id.to_string(),
                Connection {
                    generation,
                    namespace,
                    tx,
                },
            )
            .is_some()
        {
            internal!(level = WARN, "listener {id} re-registered, dropping old connection");
        }
        generation
    }

    /// Remove a registration, but only the one `generation` refers to;
    /// a newer registration under the same id stays.
    pub fn deregister(&self, id: &str, generation: u64) {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        if connections
            .get(id)
            .is_some_and(|connection| connection.generation == generation)
        {
            connections.remove(id);
        }
    }

    /// Forward one completed inbound message to every matching listener.
    ///
    /// The entire raw message is pushed once per (recipient, connection)
    /// pair, so a connection whose namespace matches several recipients
    /// of the same message receives the same bytes several times. The
    /// client treats each push as "a message arrived for recipient X".
    ///
    /// Returns the queue id assigned to the message.
    pub fn fan_out(&self, envelope: &Envelope, raw: &[u8]) -> u64 {
        let queued = self.received.fetch_add(1, Ordering::Relaxed);
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());

        for recipient in envelope.recipients() {
            for (id, connection) in connections.iter() {
                if !connection.namespace.matches(recipient) {
                    continue;
                }

                // Best effort: a connection mid-close is skipped.
                if connection.tx.send(raw.to_vec()).is_ok() {
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                    internal!(
                        level = DEBUG,
                        "SMTP -> {recipient} -> listener ({id}) [{}]",
                        connection.namespace
                    );
                } else {
                    internal!(level = DEBUG, "listener ({id}) closed, skipping push");
                }
            }
        }

        queued
    }

    /// (messages received, pushes forwarded)
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.received.load(Ordering::Relaxed),
            self.forwarded.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(recipients: &[&str]) -> Envelope {
        Envelope::new(
            "sender@example.com",
            recipients.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn forwards_to_matching_namespaces_only() {
        let registry = Registry::new();
        let (w1_tx, mut w1_rx) = mpsc::unbounded_channel();
        let (w2_tx, mut w2_rx) = mpsc::unbounded_channel();
        registry.register("a", Namespace::prefix("w1"), w1_tx);
        registry.register("b", Namespace::prefix("w2"), w2_tx);

        registry.fan_out(&envelope(&["w1user@example.com"]), b"raw bytes");

        assert_eq!(w1_rx.try_recv().unwrap(), b"raw bytes");
        assert!(w2_rx.try_recv().is_err());
        assert_eq!(registry.stats(), (1, 1));
    }

    #[test]
    fn one_push_per_recipient_connection_pair() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("a", Namespace::prefix("w1"), tx);

        registry.fan_out(
            &envelope(&["w1first@example.com", "w1second@example.com"]),
            b"raw",
        );

        // Same connection matched both recipients; same bytes twice.
        assert_eq!(rx.try_recv().unwrap(), b"raw");
        assert_eq!(rx.try_recv().unwrap(), b"raw");
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.stats(), (1, 2));
    }

    #[test]
    fn closed_connections_are_skipped() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("a", Namespace::prefix(""), tx);
        drop(rx);

        registry.fan_out(&envelope(&["user@example.com"]), b"raw");

        assert_eq!(registry.stats(), (1, 0));
    }

    #[test]
    fn deregistered_connections_receive_nothing() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = registry.register("a", Namespace::prefix(""), tx);
        registry.deregister("a", generation);

        registry.fan_out(&envelope(&["user@example.com"]), b"raw");

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_deregistration_leaves_the_live_connection() {
        let registry = Registry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let stale = registry.register("a", Namespace::prefix(""), old_tx);
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let live = registry.register("a", Namespace::prefix(""), new_tx);

        // The displaced connection unwinds after its replacement has
        // registered; its cleanup must not touch the live registration.
        registry.deregister("a", stale);

        registry.fan_out(&envelope(&["user@example.com"]), b"raw");
        assert_eq!(new_rx.try_recv().unwrap(), b"raw");
        assert_eq!(registry.stats(), (1, 1));

        // The live connection's own cleanup still works.
        registry.deregister("a", live);
        registry.fan_out(&envelope(&["user@example.com"]), b"again");
        assert!(new_rx.try_recv().is_err());
    }

    #[test]
    fn subdomain_namespaces_fan_out_too() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("a", Namespace::subdomain("w1"), tx);

        registry.fan_out(&envelope(&["user@example.com.w1"]), b"raw");
        registry.fan_out(&envelope(&["user@example.com"]), b"other");

        assert_eq!(rx.try_recv().unwrap(), b"raw");
        assert!(rx.try_recv().is_err());
    }
}
