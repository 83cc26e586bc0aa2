//! TCP client for the sync server.
//!
//! Provides:
//! - Connection setup and the `ID:` handshake
//! - Sending edits addressed at the caret of the last state received
//! - State updates as events and as an always-current watch value
//!
//! The client never edits its own copy of the document: every state it
//! exposes came from the server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::framing::FrameBuffer;
use crate::protocol::{
    ClientId, Direction, DocumentState, Edit, Operation, ProtocolError, ServerMessage,
    END_OF_MESSAGE,
};

/// How long `connect` waits for the server's greeting.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for one server message (the whole document).
const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// New authoritative state from the server
    State(DocumentState),
    /// Connection lost
    Disconnected,
}

/// Latest state plus how many states have been received so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientView {
    pub received: u64,
    pub state: DocumentState,
    pub connection: Option<ConnectionState>,
    /// Highest `seq` the server has acknowledged.
    pub acked: u64,
}

/// The sync client.
pub struct SyncClient {
    client_id: ClientId,
    server_addr: String,
    outgoing_tx: mpsc::Sender<Vec<u8>>,
    view: watch::Receiver<ClientView>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    next_seq: AtomicU64,
}

impl SyncClient {
    /// Connect and wait for the server to assign an identity.
    pub async fn connect(server_addr: impl Into<String>) -> Result<Self, ProtocolError> {
        let server_addr = server_addr.into();
        let stream = TcpStream::connect(&server_addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::spawn(write_loop(writer, out_rx));

        let (event_tx, event_rx) = mpsc::channel(256);
        let (view_tx, view_rx) = watch::channel(ClientView {
            connection: Some(ConnectionState::Connected),
            ..ClientView::default()
        });
        let (welcome_tx, welcome_rx) = oneshot::channel();
        tokio::spawn(read_loop(reader, welcome_tx, view_tx, event_tx));

        let client_id = tokio::time::timeout(HANDSHAKE_TIMEOUT, welcome_rx)
            .await
            .map_err(|_| ProtocolError::Timeout)?
            .map_err(|_| ProtocolError::ConnectionClosed)?;

        log::info!("Connected to {server_addr} as {client_id}");
        Ok(Self {
            client_id,
            server_addr,
            outgoing_tx: out_tx,
            view: view_rx,
            event_rx: Some(event_rx),
            next_seq: AtomicU64::new(1),
        })
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// The most recent state received.
    pub fn latest(&self) -> DocumentState {
        self.view.borrow().state.clone()
    }

    /// Number of state messages received so far.
    pub fn received(&self) -> u64 {
        self.view.borrow().received
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.view
            .borrow()
            .connection
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Wait until the latest state satisfies `predicate`.
    pub async fn wait_until(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&DocumentState) -> bool,
    ) -> Result<DocumentState, ProtocolError> {
        let mut view = self.view.clone();
        let waited = tokio::time::timeout(timeout, view.wait_for(|v| predicate(&v.state))).await;
        match waited {
            Ok(Ok(v)) => Ok(v.state.clone()),
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }

    /// Wait until at least `count` state messages have been received.
    pub async fn wait_for_received(&self, count: u64, timeout: Duration) -> Result<DocumentState, ProtocolError> {
        let mut view = self.view.clone();
        let waited = tokio::time::timeout(timeout, view.wait_for(|v| v.received >= count)).await;
        match waited {
            Ok(Ok(v)) => Ok(v.state.clone()),
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }

    /// Send an explicit operation.
    pub async fn send_operation(&self, op: &Operation) -> Result<(), ProtocolError> {
        let encoded = op.encode()?;
        self.outgoing_tx
            .send(encoded)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Send `edit` at the caret and version of the last state received.
    /// Returns the `seq` the server will acknowledge it with.
    pub async fn send_edit(&self, edit: Edit) -> Result<u64, ProtocolError> {
        let (cursor, version) = {
            let view = self.view.borrow();
            (view.state.cursor, view.state.version)
        };
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let op = Operation::new(self.client_id, edit, cursor, version).with_seq(seq);
        self.send_operation(&op).await?;
        Ok(seq)
    }

    /// Type one character. A blank is sent as the `space` key.
    pub async fn type_char(&self, c: char) -> Result<u64, ProtocolError> {
        let edit = if c == ' ' {
            Edit::InsertSpace
        } else {
            Edit::InsertChar(c)
        };
        self.send_edit(edit).await
    }

    pub async fn press_return(&self) -> Result<u64, ProtocolError> {
        self.send_edit(Edit::InsertReturn).await
    }

    pub async fn backspace(&self) -> Result<u64, ProtocolError> {
        self.send_edit(Edit::Backspace).await
    }

    pub async fn move_cursor(&self, direction: Direction) -> Result<u64, ProtocolError> {
        self.send_edit(Edit::CursorMove(direction)).await
    }

    /// Send `edit` and wait until the server has applied it. States caused
    /// by other clients in the meantime do not count.
    pub async fn apply(&self, edit: Edit, timeout: Duration) -> Result<DocumentState, ProtocolError> {
        let seq = self.send_edit(edit).await?;
        self.wait_for_ack(seq, timeout).await
    }

    /// Wait until the server has acknowledged `seq`.
    pub async fn wait_for_ack(&self, seq: u64, timeout: Duration) -> Result<DocumentState, ProtocolError> {
        let mut view = self.view.clone();
        let waited = tokio::time::timeout(timeout, view.wait_for(|v| v.acked >= seq)).await;
        match waited {
            Ok(Ok(v)) => Ok(v.state.clone()),
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => Err(ProtocolError::Timeout),
        }
    }

    /// Close the connection. The server drops this client's cursor once its
    /// pending operations are applied.
    pub fn disconnect(self) {
        log::info!("Disconnecting {} from {}", self.client_id, self.server_addr);
    }
}

/// Forward outgoing frames to the socket.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(data) = rx.recv().await {
        if writer.write_all(&data).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Parse server messages and publish them.
async fn read_loop(
    mut reader: OwnedReadHalf,
    welcome_tx: oneshot::Sender<ClientId>,
    view_tx: watch::Sender<ClientView>,
    event_tx: mpsc::Sender<SyncEvent>,
) {
    let mut welcome_tx = Some(welcome_tx);
    let mut messages = FrameBuffer::new(END_OF_MESSAGE, MAX_MESSAGE_LEN);
    let mut buf = vec![0u8; 8192];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                log::warn!("Read from server failed: {e}");
                break;
            }
        };

        for raw in messages.push(&buf[..n]).complete {
            let parsed = std::str::from_utf8(&raw)
                .map_err(|e| ProtocolError::Malformed(e.to_string()))
                .and_then(ServerMessage::parse);
            match parsed {
                Ok(ServerMessage::Welcome(id)) => {
                    if let Some(tx) = welcome_tx.take() {
                        let _ = tx.send(id);
                    }
                }
                Ok(ServerMessage::Ack(seq)) => {
                    view_tx.send_modify(|v| v.acked = v.acked.max(seq));
                }
                Ok(ServerMessage::State(state)) => {
                    view_tx.send_modify(|v| {
                        v.received += 1;
                        v.state = state.clone();
                    });
                    if event_tx.try_send(SyncEvent::State(state)).is_err() {
                        log::debug!("Event receiver full or gone, state only in view");
                    }
                }
                Err(e) => log::warn!("Ignoring malformed server message: {e}"),
            }
        }
    }

    view_tx.send_modify(|v| v.connection = Some(ConnectionState::Disconnected));
    let _ = event_tx.try_send(SyncEvent::Disconnected);
}
