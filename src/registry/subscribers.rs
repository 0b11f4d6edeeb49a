//! Concurrency-Safe Subscriber Bookkeeping
//!
//! The registry maps client identifier to the outbox of the connection task
//! currently subscribed under that identifier. Three rules keep it correct
//! under churn:
//!
//! 1. **One connection per identifier.** Adding an identifier that is
//!    already present displaces the previous entry; dropping the displaced
//!    outbox closes its channel, which the superseded connection task sees
//!    as its signal to shut down.
//! 2. **Guarded removal.** Removal requires the [`SubscriberId`] handed out
//!    at registration, so a superseded task that disconnects late can never
//!    evict its successor.
//! 3. **No I/O under the lock.** Broadcast snapshots the subscriber list
//!    while locked, then delivers with non-blocking `try_send` outside the
//!    lock. A slow or dead subscriber costs one failed `try_send`, never a
//!    stalled broadcast.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Undelivered pushes a single subscriber may buffer before it is treated
/// as dead and swept from the registry.
pub const OUTBOX_CAPACITY: usize = 64;

/// Identifies one registration. Connection tasks hold theirs to prove
/// ownership of a registry slot when removing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

/// The registry's half of one parked connection.
#[derive(Debug)]
struct Subscriber {
    conn: SubscriberId,
    outbox: mpsc::Sender<Bytes>,
}

/// Shared map of client identifier to live subscriber.
///
/// Wrapped in an `Arc` and shared between the dispatcher (which registers
/// and broadcasts) and every connection task (which removes itself on
/// disconnect).
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<String, Subscriber>>,
    next_conn: AtomicU64,
}

impl SubscriberRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `identifier` with a fresh outbox and returns the new
    /// subscriber id together with the receiving end.
    ///
    /// Any previous registration under the same identifier is displaced.
    /// The displaced outbox is dropped outside the lock; its connection
    /// task observes the closed channel and answers by shutting down its
    /// socket, so the client side sees a clean close.
    pub fn add(&self, identifier: &str) -> (SubscriberId, mpsc::Receiver<Bytes>) {
        let conn = SubscriberId(self.next_conn.fetch_add(1, Ordering::Relaxed));
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);

        let displaced = {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.insert(identifier.to_string(), Subscriber { conn, outbox })
        };
        if let Some(previous) = displaced {
            debug!(
                identifier = %identifier,
                superseded = previous.conn.0,
                "subscriber displaced by a newer registration"
            );
        }

        (conn, inbox)
    }

    /// Removes `identifier`'s registration, but only while it still belongs
    /// to `conn`. A no-op when the slot is empty or already owned by a
    /// successor.
    pub fn remove(&self, identifier: &str, conn: SubscriberId) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if subscribers
            .get(identifier)
            .is_some_and(|subscriber| subscriber.conn == conn)
        {
            subscribers.remove(identifier);
        }
    }

    /// Best-effort fan-out of one pre-encoded frame to every current
    /// subscriber. Returns how many outboxes accepted it.
    ///
    /// Entries are snapshotted under the lock and delivered outside it with
    /// `try_send`; a full outbox counts as dead, same as a closed one, and
    /// both are swept afterwards. The frame is a [`Bytes`] so each delivery
    /// is a cheap reference-counted clone of the same buffer.
    pub fn broadcast(&self, frame: Bytes) -> usize {
        let snapshot: Vec<(String, SubscriberId, mpsc::Sender<Bytes>)> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers
                .iter()
                .map(|(identifier, subscriber)| {
                    (
                        identifier.clone(),
                        subscriber.conn,
                        subscriber.outbox.clone(),
                    )
                })
                .collect()
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (identifier, conn, outbox) in snapshot {
            match outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(identifier = %identifier, "subscriber outbox full, sweeping");
                    dead.push((identifier, conn));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(identifier = %identifier, "subscriber gone, sweeping");
                    dead.push((identifier, conn));
                }
            }
        }
        for (identifier, conn) in dead {
            self.remove(&identifier, conn);
        }

        delivered
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    /// Returns true if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
