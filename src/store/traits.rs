//! Persistence seams: the record store and the audit log.
//!
//! The server is constructed against these traits, never against a concrete
//! backend, so tests can inject failing or instrumented stores and a real
//! deployment can swap in a durable one without touching dispatch.

use crate::protocol::{LogEntry, Record};
use thiserror::Error;

/// Failures raised by a store or log backend.
///
/// The in-memory backends never fail; the taxonomy exists for file- and
/// database-backed implementations. `Display` is the bare detail; the short
/// classifier in [`StoreError::kind`] is prepended when a failure is
/// reported over the wire.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure from a file- or network-backed store.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("{0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure description.
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Short failure classifier used in wire error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "Io",
            StoreError::Serialization(_) => "Serialization",
            StoreError::Backend(_) => "Backend",
        }
    }
}

/// Keyed record storage.
///
/// Implementations must be safe to call from many connection tasks at once.
/// `upsert` is the single serialization point for concurrent writes to one
/// id: two racing upserts may interleave in either order, but neither result
/// is ever torn.
pub trait RecordStore: Send + Sync {
    /// Looks up one record by id.
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Returns a snapshot of every stored record.
    fn list_all(&self) -> Result<Vec<Record>, StoreError>;

    /// Inserts `record` under its id, or field-wise merges it into the
    /// record already stored there. Returns the full post-merge record.
    ///
    /// Callers must hand in a record whose [`Record::id`] is present; the
    /// dispatcher rejects id-less payloads before they reach the store.
    fn upsert(&self, record: Record) -> Result<Record, StoreError>;
}

/// Append-only audit log.
///
/// The server only ever appends; no read API is required. Implementations
/// stamp [`LogEntry::ts`] with the current time when the caller left it
/// unset.
pub trait EventLog: Send + Sync {
    /// Appends one entry.
    fn append(&self, entry: LogEntry) -> Result<(), StoreError>;
}
