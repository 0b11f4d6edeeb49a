//! Subscriber Registry Module
//!
//! This module tracks which connections are parked as subscribers and fans
//! record-change pushes out to them.
//!
//! ## Architecture
//!
//! ```text
//!                      set "x1"
//!                          │
//!                ┌─────────▼──────────┐
//!                │ SubscriberRegistry │
//!                │  Mutex<HashMap<    │
//!                │   identifier,      │
//!                │   Subscriber>>     │
//!                └─────────┬──────────┘
//!        snapshot under lock, send outside it
//!          ┌───────────────┼───────────────┐
//!    ┌─────▼─────┐   ┌─────▼─────┐   ┌─────▼─────┐
//!    │ outbox A  │   │ outbox B  │   │ outbox C  │
//!    │ (mpsc 64) │   │ (mpsc 64) │   │ (mpsc 64) │
//!    └─────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!    ┌─────▼─────┐   ┌─────▼─────┐   ┌─────▼─────┐
//!    │ conn task │   │ conn task │   │ conn task │
//!    └───────────┘   └───────────┘   └───────────┘
//! ```
//!
//! The registry never touches a socket. Each parked connection task owns its
//! own socket and drains its outbox; the registry's only job is bookkeeping
//! and best-effort `try_send` fan-out.

pub mod subscribers;

// Re-export commonly used types
pub use subscribers::{SubscriberId, SubscriberRegistry, OUTBOX_CAPACITY};
