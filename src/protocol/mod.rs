//! Wire Protocol Implementation
//!
//! This module implements the complete client-server protocol: length-prefixed
//! JSON frames and the typed messages that travel inside them.
//!
//! ## Overview
//!
//! Every message is one frame: a 4-byte big-endian length followed by a UTF-8
//! JSON body. Requests and responses share the frame format; subscribers
//! additionally receive unsolicited change pushes in the same format.
//!
//! ## Modules
//!
//! - `framing`: Async frame reader/writer with the end-of-stream contract
//! - `types`: Request/response envelopes, records, and audit entries
//!
//! ## Example
//!
//! ```ignore
//! use pulsekv::protocol::{framing, RawRequest, Response};
//!
//! // Sending a request
//! let request = RawRequest::get("client-1", "x1");
//! framing::write_message(&mut stream, &request).await?;
//!
//! // Reading the single response
//! let response: Option<Response> = framing::read_message(&mut stream).await?;
//! ```

pub mod framing;
pub mod types;

// Re-export commonly used types for convenience
pub use framing::{encode_frame, read_frame, read_message, write_frame, write_message, FrameError};
pub use types::{
    Action, ChangeNotice, EnvelopeError, LogEntry, RawRequest, Record, Request, Response,
    CHANGE_ACTION,
};
