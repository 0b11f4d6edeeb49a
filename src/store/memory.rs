//! In-Memory Reference Backends
//!
//! Simple lock-protected implementations of [`RecordStore`] and
//! [`EventLog`]. These are the backends the server runs with out of the box
//! and the ones the test suite inspects; a durable deployment would replace
//! them behind the same traits.

use crate::protocol::{LogEntry, Record};
use crate::store::traits::{EventLog, RecordStore, StoreError};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Record store backed by a single `RwLock`ed map, id to record.
///
/// One lock is plenty here: every operation is a short map access, and the
/// write lock is exactly what makes concurrent upserts to the same id merge
/// one-at-a-time instead of tearing.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Returns true if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self.records.read().unwrap().get(id).cloned())
    }

    fn list_all(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self.records.read().unwrap().values().cloned().collect())
    }

    fn upsert(&self, record: Record) -> Result<Record, StoreError> {
        let id = match record.id() {
            Some(id) => id.to_string(),
            None => return Err(StoreError::Backend("record has no id".to_string())),
        };

        let mut records = self.records.write().unwrap();
        let stored = records.entry(id).or_default();
        stored.merge(record);
        Ok(stored.clone())
    }
}

/// Append-only audit log backed by a `RwLock`ed vector.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: RwLock<Vec<LogEntry>>,
}

impl MemoryEventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of appended entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Returns true if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out everything appended so far, in append order.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().unwrap().clone()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, mut entry: LogEntry) -> Result<(), StoreError> {
        if entry.ts.is_none() {
            entry.ts = Some(unix_millis());
        }
        self.entries.write().unwrap().push(entry);
        Ok(())
    }
}

/// Milliseconds since the Unix epoch.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Action;
    use serde_json::json;
    use std::sync::Arc;

    fn record(value: serde_json::Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_get_returns_none_for_absent_id() {
        let store = MemoryRecordStore::new();
        assert!(store.get("x1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_then_merges() {
        let store = MemoryRecordStore::new();

        let first = store
            .upsert(record(json!({"id": "x1", "name": "Ann"})))
            .unwrap();
        assert_eq!(first.into_value(), json!({"id": "x1", "name": "Ann"}));

        let merged = store
            .upsert(record(json!({"id": "x1", "checkpoint": "3260"})))
            .unwrap();
        assert_eq!(
            merged.into_value(),
            json!({"id": "x1", "name": "Ann", "checkpoint": "3260"})
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_upsert_rejects_record_without_id() {
        let store = MemoryRecordStore::new();
        let err = store.upsert(record(json!({"name": "Ann"}))).unwrap_err();
        assert_eq!(err.kind(), "Backend");
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_all_returns_every_record() {
        let store = MemoryRecordStore::new();
        store.upsert(record(json!({"id": "x1"}))).unwrap();
        store.upsert(record(json!({"id": "x2"}))).unwrap();

        let mut ids: Vec<String> = store
            .list_all()
            .unwrap()
            .iter()
            .map(|r| r.id().unwrap().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["x1", "x2"]);
    }

    #[test]
    fn test_concurrent_upserts_to_one_id_never_tear() {
        let store = Arc::new(MemoryRecordStore::new());
        let mut handles = Vec::new();

        for worker in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for round in 0..50 {
                    let field = format!("field_{worker}");
                    store
                        .upsert(record(json!({"id": "x1", field: round})))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Every worker's last write must be present in the merged record.
        let stored = store.get("x1").unwrap().unwrap();
        for worker in 0..8 {
            assert_eq!(
                stored.0.get(&format!("field_{worker}")),
                Some(&json!(49)),
            );
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_stamps_missing_timestamp() {
        let log = MemoryEventLog::new();
        log.append(LogEntry::attempt("client-1", "s1", Action::List, None))
            .unwrap();

        let entries = log.snapshot();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ts.is_some());
    }

    #[test]
    fn test_append_keeps_caller_timestamp() {
        let log = MemoryEventLog::new();
        let mut entry = LogEntry::attempt("client-1", "s1", Action::Get, Some("x1".into()));
        entry.ts = Some(1234);
        log.append(entry).unwrap();

        assert_eq!(log.snapshot()[0].ts, Some(1234));
    }

    #[test]
    fn test_snapshot_preserves_append_order() {
        let log = MemoryEventLog::new();
        for session in ["s1", "s2", "s3"] {
            log.append(LogEntry::attempt("client-1", session, Action::Set, None))
                .unwrap();
        }

        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].session, "s1");
        assert_eq!(snapshot[1].session, "s2");
        assert_eq!(snapshot[2].session, "s3");
    }
}
