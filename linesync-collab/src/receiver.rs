//! Per-connection receive loop.
//!
//! Reads raw bytes from one client, reassembles frames, decodes them and
//! pushes the resulting operations onto the shared queue. The loop ends when
//! the peer closes, the read fails, or nothing arrives within the idle
//! timeout; in every case a `Leave` is enqueued for the client so that its
//! pending operations are still applied before it is forgotten.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::RwLock;

use crate::framing::FrameBuffer;
use crate::protocol::{ClientId, Operation, DELIMITER};
use crate::queue::OperationQueue;
use crate::server::ServerStats;

/// Why a receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The peer closed its end of the stream.
    Closed,
    /// No data arrived within the idle timeout.
    IdleTimeout,
    /// The transport reported an error.
    TransportError,
    /// The engine stopped consuming.
    QueueClosed,
}

/// Limits applied to one connection.
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub idle_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            read_buffer_size: 1460,
            max_frame_len: 64 * 1024,
        }
    }
}

/// Receive loop state for one client.
pub struct ConnectionReceiver<R> {
    client: ClientId,
    reader: R,
    queue: OperationQueue,
    config: ReceiverConfig,
    stats: Arc<RwLock<ServerStats>>,
}

impl<R: AsyncRead + Unpin> ConnectionReceiver<R> {
    pub fn new(
        client: ClientId,
        reader: R,
        queue: OperationQueue,
        config: ReceiverConfig,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Self {
        Self {
            client,
            reader,
            queue,
            config,
            stats,
        }
    }

    /// Run until the connection ends, then enqueue the client's `Leave`.
    pub async fn run(mut self) -> Disconnect {
        let reason = self.receive().await;
        match reason {
            Disconnect::Closed => log::info!("Client {} closed the connection", self.client),
            Disconnect::IdleTimeout => log::info!(
                "Client {} idle for {:?}, disconnecting",
                self.client,
                self.config.idle_timeout
            ),
            Disconnect::TransportError | Disconnect::QueueClosed => {}
        }
        if self.queue.leave(self.client).is_err() {
            log::debug!("Engine already stopped, no leave for {}", self.client);
        }
        reason
    }

    async fn receive(&mut self) -> Disconnect {
        let mut frames = FrameBuffer::new(DELIMITER, self.config.max_frame_len);
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];

        loop {
            let read = tokio::time::timeout(self.config.idle_timeout, self.reader.read(&mut buf)).await;
            let n = match read {
                Err(_) => return Disconnect::IdleTimeout,
                Ok(Ok(0)) => return Disconnect::Closed,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    log::error!("Read error from client {}: {e}", self.client);
                    return Disconnect::TransportError;
                }
            };

            let batch = frames.push(&buf[..n]);
            if batch.oversize > 0 {
                log::warn!(
                    "Client {} sent a frame over {} bytes, discarding it",
                    self.client,
                    self.config.max_frame_len
                );
            }

            let mut accepted = 0u64;
            let mut dropped = batch.oversize as u64;
            for frame in batch.complete {
                match Operation::decode(self.client, &frame) {
                    Ok(op) => {
                        if self.queue.apply(op).is_err() {
                            return Disconnect::QueueClosed;
                        }
                        accepted += 1;
                    }
                    Err(e) => {
                        log::warn!("Dropping malformed frame from {}: {e}", self.client);
                        dropped += 1;
                    }
                }
            }

            let mut s = self.stats.write().await;
            s.total_bytes += n as u64;
            s.total_frames += accepted;
            s.dropped_frames += dropped;
        }
    }
}
