//! Length-Prefixed Frame Codec
//!
//! Every message on the wire is one frame:
//!
//! ```text
//! +------------------+----------------------+
//! | length: u32 (BE) | body: `length` bytes |
//! +------------------+----------------------+
//! ```
//!
//! The body is UTF-8 JSON. The length counts body bytes only, never the
//! 4-byte header itself. A zero-length body is a legal frame (its JSON will
//! simply fail to parse and is reported like any other malformed body).
//!
//! ## End-of-stream contract
//!
//! The reader distinguishes "the peer is gone" from "the peer sent garbage":
//!
//! - EOF before a complete header, or between header and complete body,
//!   yields `Ok(None)`. A disconnect mid-frame is a disconnect, not a
//!   protocol error.
//! - A complete frame whose body is not valid JSON yields
//!   [`FrameError::Decode`]. The caller decides how loudly to complain.
//!
//! Frames are always written with header and body in a single buffer so one
//! `write_all` puts the whole frame on the socket.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Errors that can occur while reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed mid-frame.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A complete frame arrived but its body is not valid JSON, or does not
    /// have the shape the caller asked for.
    #[error("invalid JSON body: {0}")]
    Decode(#[source] serde_json::Error),

    /// An outgoing value could not be encoded as JSON.
    #[error("JSON encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// An outgoing body is too large for the 4-byte length prefix.
    #[error("frame body of {0} bytes exceeds the u32 length prefix")]
    Oversize(usize),
}

/// Reads one raw frame body.
///
/// Returns `Ok(None)` when the stream ends before a complete frame, whether
/// that is a clean close between frames or a disconnect partway through one.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(FrameError::Io(err)),
    }

    let length = u32::from_be_bytes(header) as usize;
    let mut body = vec![0u8; length];
    match reader.read_exact(&mut body).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(FrameError::Io(err)),
    }

    Ok(Some(Bytes::from(body)))
}

/// Reads one frame and parses its JSON body into `T`.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let body = match read_frame(reader).await? {
        Some(body) => body,
        None => return Ok(None),
    };
    let message = serde_json::from_slice(&body).map_err(FrameError::Decode)?;
    Ok(Some(message))
}

/// Encodes `message` into a complete frame, header included.
///
/// Broadcast fan-out uses this to encode once and hand the same cheaply
/// cloned [`Bytes`] to every subscriber.
pub fn encode_frame<T>(message: &T) -> Result<Bytes, FrameError>
where
    T: Serialize,
{
    let body = serde_json::to_vec(message).map_err(FrameError::Encode)?;
    if body.len() > u32::MAX as usize {
        return Err(FrameError::Oversize(body.len()));
    }
    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

/// Writes one raw body as a frame.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > u32::MAX as usize {
        return Err(FrameError::Oversize(body.len()));
    }
    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.extend_from_slice(body);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Serializes `message` and writes it as a single frame.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
