//! TCP sync server.
//!
//! Architecture:
//! ```text
//! accept ──► ClientId ──┬── ConnectionReceiver (read half) ──► OperationQueue
//!                       │                                          │
//!                       └── writer task (write half) ◄── outbox ◄──┤
//!                                                                  ▼
//!                                                          DocumentEngine
//! ```
//!
//! Every connection gets two tasks: the receiver feeding the shared queue and
//! a writer draining the client's outbox to the socket. The engine runs in
//! its own task and is the only code that touches the document.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::broadcast::{outbox, OutboxReceiver};
use crate::document::Document;
use crate::engine::{DocumentEngine, Snapshot};
use crate::protocol::ClientId;
use crate::queue::{operation_queue, OperationQueue, QueueClosed};
use crate::receiver::{ConnectionReceiver, ReceiverConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Disconnect a client after this long without data
    pub idle_timeout: Duration,
    /// Size of a single socket read
    pub read_buffer_size: usize,
    /// Largest accepted frame in bytes
    pub max_frame_len: usize,
    /// Document content at startup
    pub initial_lines: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            idle_timeout: Duration::from_secs(60),
            read_buffer_size: 1460,
            max_frame_len: 64 * 1024,
            initial_lines: vec![String::new()],
        }
    }
}

impl ServerConfig {
    fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            idle_timeout: self.idle_timeout,
            read_buffer_size: self.read_buffer_size,
            max_frame_len: self.max_frame_len,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_frames: u64,
    pub dropped_frames: u64,
    pub total_bytes: u64,
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("document engine stopped unexpectedly")]
    EngineStopped,
}

impl From<QueueClosed> for ServerError {
    fn from(_: QueueClosed) -> Self {
        Self::EngineStopped
    }
}

/// The sync server: a bound listener plus a running document engine.
pub struct SyncServer {
    config: ServerConfig,
    listener: TcpListener,
    queue: OperationQueue,
    engine: JoinHandle<Snapshot>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Bind the listener and start the document engine.
    ///
    /// Failing to bind is the only fatal server error.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;

        let (queue, rx) = operation_queue();
        let doc = Document::from_lines(config.initial_lines.clone());
        let engine = tokio::spawn(DocumentEngine::new(doc).run(rx));

        log::info!("Sync server listening on {}", config.bind_addr);
        Ok(Self {
            config,
            listener,
            queue,
            engine,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// Actual bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A producer handle onto the operation queue.
    pub fn queue(&self) -> OperationQueue {
        self.queue.clone()
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<Snapshot, ServerError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until `shutdown` completes, then stop the engine
    /// once everything already queued has been applied and return the
    /// final state.
    pub async fn run_until<F>(self, shutdown: F) -> Result<Snapshot, ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr).await?,
                        // Accept errors only affect the one pending connection.
                        Err(e) => log::error!("{}", ServerError::Accept(e)),
                    }
                }
            }
        }

        log::info!("Shutting down sync server");
        let snapshot = self.queue.shutdown().await?;
        if let Err(e) = self.engine.await {
            log::error!("Document engine task failed: {e}");
        }
        Ok(snapshot)
    }

    async fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), ServerError> {
        let client = ClientId::new();
        match stream.local_addr() {
            Ok(local) => log::info!("Client {client} connected from {addr} on {local}"),
            Err(_) => log::info!("Client {client} connected from {addr}"),
        }
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Could not set TCP_NODELAY for {addr}: {e}");
        }

        {
            let mut s = self.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = outbox();
        // Registered before the receiver starts, so the client exists by the
        // time its first operation is dequeued.
        self.queue.join(client, tx)?;

        tokio::spawn(write_loop(client, write_half, rx));

        let receiver = ConnectionReceiver::new(
            client,
            read_half,
            self.queue.clone(),
            self.config.receiver_config(),
            self.stats.clone(),
        );
        let stats = self.stats.clone();
        tokio::spawn(async move {
            receiver.run().await;
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        });
        Ok(())
    }
}

/// Drain one client's outbox onto its socket until the engine drops the
/// outbox or the socket fails.
async fn write_loop(client: ClientId, mut writer: OwnedWriteHalf, mut rx: OutboxReceiver) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = writer.write_all(message.as_bytes()).await {
            log::warn!("Write to client {client} failed: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
    log::debug!("Writer for client {client} finished");
}
