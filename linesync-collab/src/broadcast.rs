//! Client registry and state fan-out.
//!
//! Each registered client owns an unbounded outbox drained by its own
//! writer task, so publishing never waits on a socket. The document body
//! is encoded once per publish and shared by every recipient; only the
//! short header (version and the recipient's own cursor) differs.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cursor::CursorTable;
use crate::document::{Document, Position};
use crate::protocol::{encode_body, encode_state, ClientId};

/// Outbound message channel of one client.
pub type Outbox = mpsc::UnboundedSender<Arc<str>>;

/// Receiving end of an [`Outbox`], held by the connection's writer task.
pub type OutboxReceiver = mpsc::UnboundedReceiver<Arc<str>>;

pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_clients: usize,
}

/// Mapping from client identity to its outbox.
///
/// Owned by the engine task alone, so the counters are plain fields.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Outbox>,
    messages_sent: u64,
    messages_dropped: u64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. A second registration replaces the old outbox.
    pub fn register(&mut self, client: ClientId, outbox: Outbox) {
        self.clients.insert(client, outbox);
    }

    /// Remove a client; dropping its outbox ends its writer task.
    pub fn remove(&mut self, client: &ClientId) -> bool {
        self.clients.remove(client).is_some()
    }

    pub fn contains(&self, client: &ClientId) -> bool {
        self.clients.contains_key(client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Queue a raw message for one client.
    pub fn send_to(&mut self, client: &ClientId, message: Arc<str>) -> bool {
        let delivered = self
            .clients
            .get(client)
            .is_some_and(|outbox| outbox.send(message).is_ok());
        self.record(delivered);
        delivered
    }

    /// Send the document to every registered client, each with its own
    /// cursor. Returns how many outboxes accepted the message.
    pub fn publish(&mut self, doc: &Document, cursors: &CursorTable) -> usize {
        let body = encode_body(doc.lines());
        let mut delivered = 0;
        for (client, outbox) in &self.clients {
            let cursor = cursors.get(client).unwrap_or_else(Position::origin);
            let message: Arc<str> = encode_state(doc.version(), cursor, &body).into();
            if outbox.send(message).is_ok() {
                delivered += 1;
            } else {
                log::debug!("Outbox of {client} is closed, dropping state v{}", doc.version());
            }
        }
        self.messages_sent += delivered as u64;
        self.messages_dropped += (self.clients.len() - delivered) as u64;
        delivered
    }

    /// Send the document to a single client at `cursor`.
    pub fn publish_to(&mut self, client: &ClientId, doc: &Document, cursor: Position) -> bool {
        let body = encode_body(doc.lines());
        self.send_to(client, encode_state(doc.version(), cursor, &body).into())
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent,
            messages_dropped: self.messages_dropped,
            active_clients: self.clients.len(),
        }
    }

    fn record(&mut self, delivered: bool) {
        if delivered {
            self.messages_sent += 1;
        } else {
            self.messages_dropped += 1;
        }
    }
}
