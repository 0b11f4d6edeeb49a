//! Connection Handler Module
//!
//! This module owns individual client connections. Each accepted socket
//! gets its own handler task; the task reads exactly one request frame and
//! then follows one of two paths.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. Read one request frame
//!        │
//!        ├── envelope invalid / get / list / set
//!        │        │
//!        │        ▼
//!        │   Write one response frame ──► close
//!        │
//!        └── subscribe
//!                 │
//!                 ▼
//!            Write ack frame
//!                 │
//!                 ▼
//!        ┌──────────────────────────────┐
//!        │        Parked loop           │
//!        │                              │
//!        │  outbox push ─► write frame  │
//!        │  socket read ─► drain/EOF    │
//!        │  outbox closed ─► shutdown   │
//!        │   (displaced by resubscribe) │
//!        └──────────────────────────────┘
//! ```
//!
//! The parked loop never dispatches again: a subscribed connection is a
//! push sink, and any bytes the peer still sends are drained and ignored.
//! Reading is still necessary, though, since it is how a disconnect is
//! noticed while pushes are quiet.

use crate::commands::{Dispatcher, Outcome};
use crate::protocol::framing::{self, FrameError};
use crate::protocol::{RawRequest, Response};
use crate::registry::SubscriberId;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Scratch buffer size for draining bytes a parked peer keeps sending.
const DRAIN_BUFFER_SIZE: usize = 512;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests dispatched
    pub requests_processed: AtomicU64,
    /// Total change pushes written to subscribers
    pub pushes_sent: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_processed(&self) {
        self.requests_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_sent(&self) {
        self.pushes_sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Holds the two halves of the stream separately so the parked loop can
/// wait on the read side while writing pushes to the write side.
pub struct ConnectionHandler {
    /// Read half of the client socket
    reader: OwnedReadHalf,

    /// Write half of the client socket
    writer: OwnedWriteHalf,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// The request dispatcher (shared across connections)
    dispatcher: Dispatcher,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `dispatcher` - The dispatcher that executes requests
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        dispatcher: Dispatcher,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        let (reader, writer) = stream.into_split();
        Self {
            reader,
            writer,
            addr,
            dispatcher,
            stats,
        }
    }

    /// Serves the connection to completion.
    ///
    /// Reads the single request, dispatches it, and either answers and
    /// closes or parks the connection as a subscriber until it ends.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.serve().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The read-dispatch-respond sequence.
    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let raw: RawRequest = match framing::read_message(&mut self.reader).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                // Peer left before sending a complete frame. Not an error.
                debug!(client = %self.addr, "Peer closed before a full request");
                return Ok(());
            }
            Err(FrameError::Decode(err)) => {
                // Undecodable body: tell the peer why before closing, on a
                // best-effort basis. The write may race the peer's own close.
                warn!(client = %self.addr, error = %err, "Undecodable request body");
                let reply = Response::error(format!("Decode: {err}"));
                let _ = framing::write_message(&mut self.writer, &reply).await;
                return Err(FrameError::Decode(err).into());
            }
            Err(err) => return Err(err.into()),
        };

        debug!(client = %self.addr, request = ?raw, "Request received");
        let outcome = self.dispatcher.execute(raw);
        self.stats.request_processed();

        match outcome {
            Outcome::Respond(response) => {
                framing::write_message(&mut self.writer, &response).await?;
                debug!(client = %self.addr, ok = response.ok, "Response sent");
                Ok(())
            }
            Outcome::Park {
                ack,
                identifier,
                conn,
                inbox,
            } => {
                // The ack must hit the wire before any push can.
                framing::write_message(&mut self.writer, &ack).await?;
                info!(client = %self.addr, identifier = %identifier, "Subscriber parked");
                self.pump_pushes(identifier, conn, inbox).await
            }
        }
    }

    /// Holds a subscribed connection open and forwards pushes until it ends.
    ///
    /// Three exits:
    /// - the registry displaced this subscriber (outbox closed): shut the
    ///   socket down so the client sees a clean close, and leave the slot
    ///   to the successor;
    /// - the peer disconnected: deregister and finish cleanly;
    /// - a push write failed: deregister and surface the error.
    async fn pump_pushes(
        &mut self,
        identifier: String,
        conn: SubscriberId,
        mut inbox: mpsc::Receiver<Bytes>,
    ) -> Result<(), ConnectionError> {
        let mut drain = [0u8; DRAIN_BUFFER_SIZE];
        loop {
            tokio::select! {
                push = inbox.recv() => match push {
                    Some(frame) => {
                        if let Err(err) = self.writer.write_all(&frame).await {
                            debug!(client = %self.addr, error = %err, "Push write failed");
                            self.dispatcher.registry().remove(&identifier, conn);
                            return Err(err.into());
                        }
                        self.stats.push_sent();
                    }
                    None => {
                        info!(
                            client = %self.addr,
                            identifier = %identifier,
                            "Subscriber displaced by a newer registration"
                        );
                        let _ = self.writer.shutdown().await;
                        return Ok(());
                    }
                },
                read = self.reader.read(&mut drain) => match read {
                    Ok(0) => {
                        info!(client = %self.addr, identifier = %identifier, "Subscriber disconnected");
                        self.dispatcher.registry().remove(&identifier, conn);
                        return Ok(());
                    }
                    Ok(n) => {
                        // A subscribed connection takes no further requests.
                        debug!(client = %self.addr, bytes = n, "Ignoring bytes from subscribed peer");
                    }
                    Err(err) => {
                        debug!(client = %self.addr, error = %err, "Subscriber read failed");
                        self.dispatcher.registry().remove(&identifier, conn);
                        return Err(err.into());
                    }
                },
            }
        }
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame codec error
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler and runs
/// it to completion, absorbing errors so a failed client can never take the
/// accept loop down with it.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `dispatcher` - The dispatcher that executes requests
/// * `stats` - Shared connection statistics
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: Dispatcher,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, dispatcher, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::framing::{read_message, write_frame, write_message};
    use crate::protocol::ChangeNotice;
    use crate::registry::SubscriberRegistry;
    use crate::store::{EventLog, MemoryEventLog, MemoryRecordStore, RecordStore};
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    struct TestServer {
        addr: SocketAddr,
        store: Arc<MemoryRecordStore>,
        log: Arc<MemoryEventLog>,
        registry: Arc<SubscriberRegistry>,
        stats: Arc<ConnectionStats>,
    }

    async fn create_test_server() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let log = Arc::new(MemoryEventLog::new());
        let registry = Arc::new(SubscriberRegistry::new());
        let stats = Arc::new(ConnectionStats::new());
        let dispatcher = Dispatcher::new(
            store.clone() as Arc<dyn RecordStore>,
            log.clone() as Arc<dyn EventLog>,
            registry.clone(),
        );

        let stats_clone = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let dispatcher = dispatcher.clone();
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, dispatcher, stats));
            }
        });

        TestServer {
            addr,
            store,
            log,
            registry,
            stats,
        }
    }

    /// One-shot request helper: connect, send, read the single response.
    async fn roundtrip(addr: SocketAddr, request: &RawRequest) -> Response {
        let mut client = TcpStream::connect(addr).await.unwrap();
        write_message(&mut client, request).await.unwrap();
        timeout(Duration::from_secs(2), read_message(&mut client))
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    async fn next_push(client: &mut TcpStream) -> Option<ChangeNotice> {
        timeout(Duration::from_secs(2), read_message(client))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get_across_connections() {
        let server = create_test_server().await;

        let set = roundtrip(
            server.addr,
            &RawRequest::set("client-1", json!({"id": "x1", "name": "Ann"})),
        )
        .await;
        assert!(set.ok);

        let get = roundtrip(server.addr, &RawRequest::get("client-2", "x1")).await;
        assert_eq!(get.data, Some(json!({"id": "x1", "name": "Ann"})));
    }

    #[tokio::test]
    async fn test_connection_closes_after_one_response() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        write_message(&mut client, &RawRequest::list("client-1"))
            .await
            .unwrap();

        let response: Response = read_message(&mut client).await.unwrap().unwrap();
        assert!(response.ok);

        // The server hangs up once the response is written.
        let eof: Option<Response> =
            timeout(Duration::from_secs(2), read_message(&mut client))
                .await
                .unwrap()
                .unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let server = create_test_server().await;

        let response = roundtrip(
            server.addr,
            &RawRequest {
                action: Some("list".into()),
                ..RawRequest::default()
            },
        )
        .await;
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("Missing UUID"));
        assert!(server.log.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_is_reported_verbatim() {
        let server = create_test_server().await;

        let response = roundtrip(
            server.addr,
            &RawRequest {
                client_id: Some("client-1".into()),
                action: Some("Frobnicate".into()),
                ..RawRequest::default()
            },
        )
        .await;
        assert_eq!(response.error.as_deref(), Some("Unknown ACTION 'Frobnicate'"));
    }

    #[tokio::test]
    async fn test_malformed_body_gets_decode_error_then_close() {
        let server = create_test_server().await;

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        write_frame(&mut client, b"{not json").await.unwrap();

        let response: Response = timeout(Duration::from_secs(2), read_message(&mut client))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!response.ok);
        assert!(response.error.unwrap().starts_with("Decode:"));

        // The listener shrugs it off; the next client is served normally.
        let next = roundtrip(server.addr, &RawRequest::list("client-1")).await;
        assert!(next.ok);
    }

    #[tokio::test]
    async fn test_client_vanishing_without_a_request_is_quiet() {
        let server = create_test_server().await;

        let client = TcpStream::connect(server.addr).await.unwrap();
        drop(client);

        let response = roundtrip(server.addr, &RawRequest::list("client-1")).await;
        assert!(response.ok);
    }

    #[tokio::test]
    async fn test_subscriber_receives_each_change() {
        let server = create_test_server().await;

        // Park a subscriber.
        let mut watcher = TcpStream::connect(server.addr).await.unwrap();
        write_message(&mut watcher, &RawRequest::subscribe("watcher-1"))
            .await
            .unwrap();
        let ack: Response = read_message(&mut watcher).await.unwrap().unwrap();
        assert_eq!(ack, Response::subscribed());

        // A writer stores a record, then updates it.
        let set = roundtrip(
            server.addr,
            &RawRequest::set("writer-1", json!({"id": "x1", "name": "Ann"})),
        )
        .await;
        assert!(set.ok);

        let push = next_push(&mut watcher).await.unwrap();
        assert_eq!(push.action, "change");
        assert_eq!(push.data.into_value(), json!({"id": "x1", "name": "Ann"}));

        roundtrip(
            server.addr,
            &RawRequest::set("writer-1", json!({"id": "x1", "checkpoint": "3260"})),
        )
        .await;

        // The second push carries the merged record.
        let push = next_push(&mut watcher).await.unwrap();
        assert_eq!(
            push.data.into_value(),
            json!({"id": "x1", "name": "Ann", "checkpoint": "3260"})
        );

        // And an ordinary get sees the same state.
        let get = roundtrip(server.addr, &RawRequest::get("reader-1", "x1")).await;
        assert_eq!(
            get.data,
            Some(json!({"id": "x1", "name": "Ann", "checkpoint": "3260"}))
        );
    }

    #[tokio::test]
    async fn test_resubscribe_displaces_previous_connection() {
        let server = create_test_server().await;

        let mut first = TcpStream::connect(server.addr).await.unwrap();
        write_message(&mut first, &RawRequest::subscribe("watcher-1"))
            .await
            .unwrap();
        let _: Response = read_message(&mut first).await.unwrap().unwrap();

        let mut second = TcpStream::connect(server.addr).await.unwrap();
        write_message(&mut second, &RawRequest::subscribe("watcher-1"))
            .await
            .unwrap();
        let _: Response = read_message(&mut second).await.unwrap().unwrap();

        // The first connection is closed by the server.
        let eof = next_push(&mut first).await;
        assert!(eof.is_none());
        assert_eq!(server.registry.len(), 1);

        // Only the second connection gets subsequent pushes.
        roundtrip(
            server.addr,
            &RawRequest::set("writer-1", json!({"id": "x1", "name": "Ann"})),
        )
        .await;
        let push = next_push(&mut second).await.unwrap();
        assert_eq!(push.data.id(), Some("x1"));
    }

    #[tokio::test]
    async fn test_subscriber_disconnect_deregisters_it() {
        let server = create_test_server().await;

        let mut watcher = TcpStream::connect(server.addr).await.unwrap();
        write_message(&mut watcher, &RawRequest::subscribe("watcher-1"))
            .await
            .unwrap();
        let _: Response = read_message(&mut watcher).await.unwrap().unwrap();
        assert_eq!(server.registry.len(), 1);

        drop(watcher);

        // Give the parked task a moment to notice the close.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.registry.len(), 0);

        // Writes still succeed with nobody listening.
        let set = roundtrip(
            server.addr,
            &RawRequest::set("writer-1", json!({"id": "x1"})),
        )
        .await;
        assert!(set.ok);
    }

    #[tokio::test]
    async fn test_requests_are_audited_end_to_end() {
        let server = create_test_server().await;

        roundtrip(
            server.addr,
            &RawRequest::set("writer-1", json!({"id": "x1", "name": "Ann"})),
        )
        .await;
        roundtrip(server.addr, &RawRequest::get("reader-1", "x1")).await;

        let entries = server.log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "set");
        assert_eq!(entries[0].id.as_deref(), Some("x1"));
        assert_eq!(entries[1].action, "get");
        assert_eq!(entries[1].client_id, "reader-1");
        assert_eq!(server.store.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = create_test_server().await;

        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 0);

        let mut watcher = TcpStream::connect(server.addr).await.unwrap();
        write_message(&mut watcher, &RawRequest::subscribe("watcher-1"))
            .await
            .unwrap();
        let _: Response = read_message(&mut watcher).await.unwrap().unwrap();

        sleep(Duration::from_millis(50)).await;
        assert_eq!(server.stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 1);

        roundtrip(
            server.addr,
            &RawRequest::set("writer-1", json!({"id": "x1"})),
        )
        .await;
        let _ = next_push(&mut watcher).await.unwrap();

        sleep(Duration::from_millis(50)).await;
        assert!(server.stats.requests_processed.load(Ordering::Relaxed) >= 2);
        assert!(server.stats.pushes_sent.load(Ordering::Relaxed) >= 1);

        drop(watcher);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
