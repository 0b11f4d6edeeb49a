//! Request Dispatch Module
//!
//! This module implements the request processing layer of the server.
//! It validates incoming envelopes, writes the audit entry, executes the
//! requested action against the record store, and tells the connection
//! layer what to do next.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame Codec    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (this module)
//! │                 │
//! │  - Validate     │
//! │  - Audit        │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!    ┌─────┴──────┬───────────────┐
//!    ▼            ▼               ▼
//! RecordStore  EventLog  SubscriberRegistry
//! ```
//!
//! ## Supported Actions
//!
//! - `subscribe` - Park the connection and stream every future change to it
//! - `get` - Fetch one record by `ID`
//! - `list` - Fetch every stored record
//! - `set` - Insert or field-wise update the record in `DATA`, then notify
//!   all subscribers
//!
//! Every request is answered with exactly one response frame; `subscribe`
//! answers with an acknowledgement and then keeps the connection open as a
//! push sink.

pub mod dispatcher;

// Re-export the main dispatcher types
pub use dispatcher::{Dispatcher, Outcome};
