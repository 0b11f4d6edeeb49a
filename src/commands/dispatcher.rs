//! Request Dispatcher
//!
//! One dispatcher instance serves the whole process. It owns no sockets and
//! does no I/O of its own; connection tasks hand it a decoded request and
//! act on the returned [`Outcome`].
//!
//! ## Processing Order
//!
//! Every request goes through the same fixed stages:
//!
//! 1. **Envelope validation** - identity present, action recognized.
//!    Failures are answered immediately and leave no audit entry.
//! 2. **Audit** - one [`LogEntry`] per validated envelope, stamped with a
//!    fresh server-issued session token. The entry is written before the
//!    action runs, so attempts that fail action-specific checks are still
//!    on record.
//! 3. **Action checks** - `get` needs an `ID`, `set` needs an object in
//!    `DATA` carrying a non-empty string `id`.
//! 4. **Execution** - store call, and for `set` a best-effort broadcast of
//!    the post-merge record to every subscriber.
//!
//! Store and log failures never tear down the server; they come back to the
//! requesting client as `"<kind>: <detail>"`.

use crate::protocol::framing;
use crate::protocol::{Action, ChangeNotice, LogEntry, RawRequest, Record, Request, Response};
use crate::registry::{SubscriberId, SubscriberRegistry};
use crate::store::{EventLog, RecordStore, StoreError};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

/// Error sent when `get` arrives without a usable `ID`.
const MISSING_ID: &str = "Missing ID";

/// Error sent when `set` arrives without an object payload carrying an id.
const MISSING_DATA_ID: &str = "Missing id in DATA";

/// What the connection task should do after dispatching one request.
#[derive(Debug)]
pub enum Outcome {
    /// Write the response, then close the connection.
    Respond(Response),

    /// Write the acknowledgement, then park the connection as a push sink
    /// for the registration created here.
    Park {
        ack: Response,
        identifier: String,
        conn: SubscriberId,
        inbox: mpsc::Receiver<Bytes>,
    },
}

/// Validates, audits, and executes requests against injected collaborators.
///
/// Cheap to clone; every connection task gets its own clone holding `Arc`s
/// to the shared store, log, and registry.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn RecordStore>,
    log: Arc<dyn EventLog>,
    registry: Arc<SubscriberRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given collaborators.
    pub fn new(
        store: Arc<dyn RecordStore>,
        log: Arc<dyn EventLog>,
        registry: Arc<SubscriberRegistry>,
    ) -> Self {
        Self {
            store,
            log,
            registry,
        }
    }

    /// The registry this dispatcher broadcasts through. Connection tasks
    /// use it to deregister themselves on disconnect.
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Runs one request through validation, audit, and execution.
    pub fn execute(&self, raw: RawRequest) -> Outcome {
        let request = match raw.validate() {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "request failed envelope validation");
                return Outcome::Respond(Response::error(err.to_string()));
            }
        };

        if let Err(err) = self.log_attempt(&request) {
            return Outcome::Respond(self.dependency_failure(err));
        }

        match request.action {
            Action::Subscribe => self.cmd_subscribe(&request),
            Action::Get => Outcome::Respond(self.cmd_get(&request)),
            Action::List => Outcome::Respond(self.cmd_list()),
            Action::Set => Outcome::Respond(self.cmd_set(&request)),
        }
    }

    /// Appends the audit entry for a validated envelope.
    ///
    /// The logged id is whatever the request claims to target: `ID` for
    /// `get`, `DATA.id` for `set`, nothing for the others. No validation
    /// has happened yet, so an id may be absent even where required.
    fn log_attempt(&self, request: &Request) -> Result<(), StoreError> {
        let id = match request.action {
            Action::Get => request.id.clone(),
            Action::Set => request
                .data
                .as_ref()
                .and_then(|data| data.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string),
            Action::Subscribe | Action::List => None,
        };

        self.log.append(LogEntry::attempt(
            request.client_id.clone(),
            Uuid::new_v4().to_string(),
            request.action,
            id,
        ))
    }

    /// Registers the caller and hands the connection task everything it
    /// needs to serve the subscription.
    fn cmd_subscribe(&self, request: &Request) -> Outcome {
        let (conn, inbox) = self.registry.add(&request.client_id);
        debug!(identifier = %request.client_id, "subscriber registered");
        Outcome::Park {
            ack: Response::subscribed(),
            identifier: request.client_id.clone(),
            conn,
            inbox,
        }
    }

    fn cmd_get(&self, request: &Request) -> Response {
        let id = match request.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Response::error(MISSING_ID),
        };

        match self.store.get(id) {
            Ok(Some(record)) => Response::with_data(record.into_value()),
            Ok(None) => Response::not_found(),
            Err(err) => self.dependency_failure(err),
        }
    }

    fn cmd_list(&self) -> Response {
        match self.store.list_all() {
            Ok(records) => {
                let records = records.into_iter().map(Record::into_value).collect();
                Response::with_data(Value::Array(records))
            }
            Err(err) => self.dependency_failure(err),
        }
    }

    /// Upserts the payload record and notifies subscribers.
    ///
    /// The payload must be a JSON object with a non-empty string `id`;
    /// anything else is rejected before the store is touched, so a bad
    /// `set` never mutates anything and never produces a push.
    fn cmd_set(&self, request: &Request) -> Response {
        let record = match request.data.clone().and_then(Record::from_value) {
            Some(record) if record.id().is_some() => record,
            _ => return Response::error(MISSING_DATA_ID),
        };

        let stored = match self.store.upsert(record) {
            Ok(stored) => stored,
            Err(err) => return self.dependency_failure(err),
        };

        self.notify_change(stored.clone());
        Response::with_data(stored.into_value())
    }

    /// Encodes the post-merge record once and fans it out to every current
    /// subscriber. Delivery is best-effort; the response to the writer does
    /// not depend on it.
    fn notify_change(&self, record: Record) {
        match framing::encode_frame(&ChangeNotice::new(record)) {
            Ok(frame) => {
                let delivered = self.registry.broadcast(frame);
                debug!(delivered, "change notice broadcast");
            }
            Err(err) => error!(error = %err, "failed to encode change notice"),
        }
    }

    /// A store or log failure: logged server-side, reported to the caller
    /// as `"<kind>: <detail>"`, fatal to nothing.
    fn dependency_failure(&self, err: StoreError) -> Response {
        error!(kind = err.kind(), error = %err, "backend call failed during dispatch");
        Response::error(format!("{}: {}", err.kind(), err))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscribers", &self.registry.len())
            .finish()
    }
}
