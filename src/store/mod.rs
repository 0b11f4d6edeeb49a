//! Record Store Module
//!
//! This module provides the persistence seam of the server: a trait for the
//! record store, a trait for the append-only audit log, and in-memory
//! reference implementations of both.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Dispatcher                       │
//! │        (holds Arc<dyn RecordStore> + EventLog)       │
//! └──────────────┬──────────────────────┬────────────────┘
//!                │                      │
//!      ┌─────────▼─────────┐  ┌─────────▼─────────┐
//!      │   RecordStore     │  │     EventLog      │
//!      │ get / list / up-  │  │      append       │
//!      │ sert by record id │  │  (ts stamped if   │
//!      │                   │  │      unset)       │
//!      └─────────┬─────────┘  └─────────┬─────────┘
//!                │                      │
//!      ┌─────────▼─────────┐  ┌─────────▼─────────┐
//!      │ MemoryRecordStore │  │  MemoryEventLog   │
//!      │ RwLock<HashMap>   │  │   RwLock<Vec>     │
//!      └───────────────────┘  └───────────────────┘
//! ```
//!
//! The traits are synchronous: in-memory backends only take a lock, and a
//! file- or database-backed implementation is expected to do its own
//! blocking internally. Dispatch therefore never awaits a store call.
//!
//! ## Example
//!
//! ```
//! use pulsekv::store::{MemoryRecordStore, RecordStore};
//! use pulsekv::protocol::Record;
//! use serde_json::json;
//!
//! let store = MemoryRecordStore::new();
//! let record = Record::from_value(json!({"id": "x1", "name": "Ann"})).unwrap();
//! store.upsert(record).unwrap();
//!
//! let found = store.get("x1").unwrap().unwrap();
//! assert_eq!(found.id(), Some("x1"));
//! ```

pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use memory::{MemoryEventLog, MemoryRecordStore};
pub use traits::{EventLog, RecordStore, StoreError};
