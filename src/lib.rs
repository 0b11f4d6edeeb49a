//! # PulseKV - A Record Store That Pushes Its Changes
//!
//! PulseKV is a small TCP server for JSON records. Clients store and fetch
//! records over a simple framed protocol, and any client can subscribe to
//! receive every future record change the moment it happens.
//!
//! ## Features
//!
//! - **Framed JSON protocol**: 4-byte length prefix, JSON body, easy to
//!   speak from any language
//! - **Live change feed**: `subscribe` turns a connection into a push sink
//!   that receives every stored record as it lands
//! - **Field-wise updates**: `set` merges into the existing record instead
//!   of replacing it, so partial updates never erase data
//! - **Audit log**: every validated request is recorded with a
//!   server-issued session token and timestamp
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            PulseKV                              │
//! │                                                                 │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │ TCP Server  │───>│ Connection  │───>│ Dispatcher  │          │
//! │  │ (Listener)  │    │  Handler    │    │             │          │
//! │  └─────────────┘    └──────▲──────┘    └──────┬──────┘          │
//! │                           │                  │                  │
//! │                     push frames    ┌─────────┼─────────┐        │
//! │                           │        ▼         ▼         ▼        │
//! │                    ┌──────┴──────────┐ ┌──────────┐ ┌─────────┐ │
//! │                    │   Subscriber    │ │  Record  │ │  Event  │ │
//! │                    │    Registry     │ │  Store   │ │   Log   │ │
//! │                    │ (outbox per     │ │ (RwLock  │ │ (RwLock │ │
//! │                    │  subscriber)    │ │ HashMap) │ │   Vec)  │ │
//! │                    └─────────────────┘ └──────────┘ └─────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use pulsekv::commands::Dispatcher;
//! use pulsekv::connection::{handle_connection, ConnectionStats};
//! use pulsekv::registry::SubscriberRegistry;
//! use pulsekv::store::{MemoryEventLog, MemoryRecordStore};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Construct the collaborators once and inject them everywhere.
//!     let dispatcher = Dispatcher::new(
//!         Arc::new(MemoryRecordStore::new()),
//!         Arc::new(MemoryEventLog::new()),
//!         Arc::new(SubscriberRegistry::new()),
//!     );
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     // Start listening for connections
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             dispatcher.clone(),
//!             Arc::clone(&stats),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Wire Protocol
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes of
//! UTF-8 JSON. A connection carries one request and one response, except
//! for `subscribe`, which keeps the connection open for pushes.
//!
//! ### Actions
//!
//! - `{"UUID": u, "ACTION": "set", "DATA": {"id": ..., ...}}` - store or
//!   field-wise update a record; answers with the post-merge record and
//!   notifies every subscriber
//! - `{"UUID": u, "ACTION": "get", "ID": i}` - fetch one record
//! - `{"UUID": u, "ACTION": "list"}` - fetch all records
//! - `{"UUID": u, "ACTION": "subscribe"}` - park this connection; every
//!   future change arrives as `{"ACTION": "change", "DATA": record}`
//!
//! `UUID` is required on every request, and `ACTION` is matched after
//! trimming and lowercasing. Errors come back as
//! `{"OK": false, "Error": reason}`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: frame codec and wire message types
//! - [`store`]: record store and audit log seams plus in-memory backends
//! - [`registry`]: subscriber bookkeeping and broadcast fan-out
//! - [`commands`]: envelope validation, audit, and action execution
//! - [`connection`]: per-connection task, one-shot and parked modes
//! - [`client`]: helpers for programs talking to the server
//!
//! ## Design Highlights
//!
//! ### One connection per identifier
//!
//! Subscribing an identifier that is already subscribed displaces the old
//! connection: the server shuts it down and the newest connection owns the
//! feed. Reconnecting clients therefore never leak parked sockets.
//!
//! ### Broadcast without back-pressure
//!
//! The registry never writes to sockets. Each subscriber has a bounded
//! outbox drained by its own connection task; fan-out is a `try_send` per
//! subscriber, and an outbox that is full or closed gets its subscriber
//! swept. A stalled reader costs one sweep, never a stalled writer.
//!
//! ### Stores behind traits
//!
//! Dispatch talks to [`store::RecordStore`] and [`store::EventLog`] trait
//! objects. The bundled backends are in-memory; a durable one slots in
//! without touching protocol or dispatch code.

pub mod client;
pub mod commands;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod store;

// Re-export commonly used types for convenience
pub use commands::{Dispatcher, Outcome};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{Action, ChangeNotice, FrameError, RawRequest, Record, Response};
pub use registry::SubscriberRegistry;
pub use store::{EventLog, MemoryEventLog, MemoryRecordStore, RecordStore, StoreError};

/// The default port the server listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host the server binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of PulseKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
