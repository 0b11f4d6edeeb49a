//! Client-Side Helpers
//!
//! Thin wrappers over the frame codec for programs talking to the server:
//! a one-shot request helper and a [`Subscription`] handle for consuming
//! change pushes. The `pulsekv-cli` binary is built on these, and so are
//! the integration tests.
//!
//! The protocol is deliberately small on this side too. A request is one
//! connection: connect, send one frame, read one frame. A subscription is
//! one connection that stays open: connect, send the subscribe frame, read
//! the acknowledgement, then read pushes until the server hangs up.

use crate::protocol::framing::{self, FrameError};
use crate::protocol::{ChangeNotice, RawRequest, Response};
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Errors surfaced to client-side callers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server, or the connection failed mid-exchange.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent something the codec could not handle.
    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    /// The server closed the connection without answering.
    #[error("server closed the connection before replying")]
    NoReply,

    /// The server answered a subscribe request with a failure.
    #[error("subscription refused: {0}")]
    Refused(String),
}

/// Sends one request and returns the single response frame.
///
/// The connection is dropped afterwards; the server closes its side after
/// answering anyway.
pub async fn request(
    addr: impl ToSocketAddrs,
    request: &RawRequest,
) -> Result<Response, ClientError> {
    let mut stream = TcpStream::connect(addr).await?;
    framing::write_message(&mut stream, request).await?;
    match framing::read_message(&mut stream).await? {
        Some(response) => Ok(response),
        None => Err(ClientError::NoReply),
    }
}

/// A live subscription: an acknowledged connection the server pushes
/// change notices into.
#[derive(Debug)]
pub struct Subscription {
    stream: TcpStream,
    identifier: String,
}

impl Subscription {
    /// Subscribes under `identifier` and verifies the acknowledgement.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        identifier: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let identifier = identifier.into();
        let mut stream = TcpStream::connect(addr).await?;

        framing::write_message(&mut stream, &RawRequest::subscribe(identifier.clone())).await?;
        let ack: Response = match framing::read_message(&mut stream).await? {
            Some(ack) => ack,
            None => return Err(ClientError::NoReply),
        };
        if !ack.ok {
            let reason = ack.error.unwrap_or_else(|| "no reason given".to_string());
            return Err(ClientError::Refused(reason));
        }

        debug!(identifier = %identifier, "subscription acknowledged");
        Ok(Self { stream, identifier })
    }

    /// The identifier this subscription is registered under.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Waits for the next change push.
    ///
    /// Returns `None` once the server closes the connection, which happens
    /// when the same identifier subscribes again from somewhere else.
    pub async fn next(&mut self) -> Result<Option<ChangeNotice>, ClientError> {
        Ok(framing::read_message(&mut self.stream).await?)
    }
}
