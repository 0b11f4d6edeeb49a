//! Connection Handling Module
//!
//! This module manages individual client connections. Each accepted socket
//! is handled by its own async task, so slow readers, parked subscribers,
//! and one-shot requests all coexist without blocking each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌──────────────┐    ┌──────────────┐   │
//! │  │ Read frame  │───>│   Dispatch   │───>│ Respond+close│   │
//! │  └─────────────┘    └──────┬───────┘    └──────────────┘   │
//! │                            │ subscribe                     │
//! │                            ▼                               │
//! │                     ┌─────────────┐                        │
//! │                     │ Park + push │                        │
//! │                     └─────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **One request per connection**: read, dispatch, answer, close
//! - **Parked subscribers**: subscribe connections stay open as push sinks
//! - **Statistics**: Tracks connection and push metrics
//!
//! ## Example
//!
//! ```ignore
//! use pulsekv::connection::{handle_connection, ConnectionStats};
//! use pulsekv::commands::Dispatcher;
//! use std::sync::Arc;
//!
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, dispatcher.clone(), stats.clone()));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
