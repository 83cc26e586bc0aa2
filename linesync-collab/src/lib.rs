//! # linesync-collab: Shared line document with a central sync server
//!
//! Many clients edit one document over plain TCP. The server is the only
//! source of truth: it serializes every client operation through a single
//! queue, applies it, and sends the full document back out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   JSON frames ␝   ┌────────────────────┐
//! │ SyncClient  │ ────────────────► │ ConnectionReceiver │ (one per client)
//! │ (per user)  │                   └─────────┬──────────┘
//! └──────▲──────┘                             │
//!        │                                    ▼
//!        │                          ┌────────────────────┐
//!        │                          │ OperationQueue     │ (FIFO, many → one)
//!        │                          └─────────┬──────────┘
//!        │                                    ▼
//!        │  VERSION/CURSOR/lines ␞  ┌────────────────────┐
//!        └───────── outbox ◄─────── │ DocumentEngine     │ Document + CursorTable
//!                                   └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`document`]: line buffer and version counter
//! - [`cursor`]: per-client carets and how edits shift them
//! - [`protocol`]: client frames and server messages
//! - [`framing`]: reassembly of delimiter-terminated frames
//! - [`queue`]: the operation queue
//! - [`engine`]: the single consumer that applies operations
//! - [`broadcast`]: client registry and state fan-out
//! - [`receiver`]: per-connection receive loop
//! - [`server`]: TCP listener and connection tasks
//! - [`client`]: TCP client
//! - [`storage`]: load/save a document as text lines

pub mod document;
pub mod cursor;
pub mod protocol;
pub mod framing;
pub mod queue;
pub mod engine;
pub mod broadcast;
pub mod receiver;
pub mod server;
pub mod client;
pub mod storage;

// Re-exports for convenience
pub use document::{Document, Position};
pub use cursor::CursorTable;
pub use protocol::{
    ClientId, Direction, DocumentState, Edit, Operation, ProtocolError, ServerMessage,
    DELIMITER, END_OF_MESSAGE,
};
pub use queue::{operation_queue, Command, OperationQueue, QueueClosed, QueueReceiver};
pub use engine::{DiscardReason, DocumentEngine, Outcome, Snapshot};
pub use broadcast::{BroadcastStats, ClientRegistry};
pub use receiver::{ConnectionReceiver, Disconnect, ReceiverConfig};
pub use server::{ServerConfig, ServerError, ServerStats, SyncServer};
pub use client::{ClientView, ConnectionState, SyncClient, SyncEvent};
pub use storage::{load_lines, save_lines, StorageError};
