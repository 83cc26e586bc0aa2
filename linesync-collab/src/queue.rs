//! The operation queue: many producers, one consumer.
//!
//! Every connection pushes into the same unbounded channel and the document
//! engine is the only receiver, so the order in which commands are enqueued
//! is the order in which they are applied. Joins and leaves travel through
//! the same queue, which keeps the engine the sole owner of shared state and
//! orders a client's disconnect after its pending operations.

use tokio::sync::{mpsc, oneshot};

use crate::broadcast::Outbox;
use crate::protocol::{ClientId, Operation};
use crate::engine::Snapshot;

/// A unit of work for the document engine.
#[derive(Debug)]
pub enum Command {
    /// Register a client and its outbound channel.
    Join { client: ClientId, outbox: Outbox },
    /// Apply one client operation.
    Apply(Operation),
    /// Forget a client.
    Leave(ClientId),
    /// Report the current state without changing it.
    Snapshot(oneshot::Sender<Snapshot>),
    /// Stop the engine and hand back the final state.
    Shutdown(oneshot::Sender<Snapshot>),
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    tx: mpsc::UnboundedSender<Command>,
}

/// Consumer side of the queue, owned by the engine.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Command>,
}

/// Create a connected queue pair.
pub fn operation_queue() -> (OperationQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OperationQueue { tx }, QueueReceiver { rx })
}

impl OperationQueue {
    /// Enqueue without blocking. Fails only once the engine has stopped.
    pub fn push(&self, command: Command) -> Result<(), QueueClosed> {
        self.tx.send(command).map_err(|_| QueueClosed)
    }

    pub fn join(&self, client: ClientId, outbox: Outbox) -> Result<(), QueueClosed> {
        self.push(Command::Join { client, outbox })
    }

    pub fn apply(&self, op: Operation) -> Result<(), QueueClosed> {
        self.push(Command::Apply(op))
    }

    pub fn leave(&self, client: ClientId) -> Result<(), QueueClosed> {
        self.push(Command::Leave(client))
    }

    /// Ask the engine for its current state.
    pub async fn snapshot(&self) -> Result<Snapshot, QueueClosed> {
        let (reply, rx) = oneshot::channel();
        self.push(Command::Snapshot(reply))?;
        rx.await.map_err(|_| QueueClosed)
    }

    /// Stop the engine after everything already queued has been applied.
    pub async fn shutdown(&self) -> Result<Snapshot, QueueClosed> {
        let (reply, rx) = oneshot::channel();
        self.push(Command::Shutdown(reply))?;
        rx.await.map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReceiver {
    /// Wait for the next command. `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    /// Take a command if one is ready.
    pub fn try_recv(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }
}

/// The engine is no longer consuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation queue closed")]
pub struct QueueClosed;
