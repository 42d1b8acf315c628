//! Inbound command records.
//!
//! [`decode`] parses one record from the front of a byte slice and reports
//! how many bytes it consumed. Variable-length fields are kept as offsets
//! relative to the record start, so the caller can move the record bytes
//! into whichever buffer will own them before resolving the fields.

use std::ops::Range;

use super::wire_format::{Cursor, MessageTag, TransId, TRANS_ID_SIZE};
use crate::error::{ApiError, Result};

/// Whether a request expects an asynchronous or synchronous reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum Command {
    /// Reply with `return_async` / `forward_async`.
    Async = 1,
    /// Reply with `return_sync` / `forward_sync`.
    Sync = -1,
}

/// Handshake parameters assigned by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitRecord {
    /// Prefix string, without its NUL terminator.
    pub prefix: Range<usize>,
    /// Default timeout for asynchronous calls (ms).
    pub timeout_async: u32,
    /// Default timeout for synchronous calls (ms).
    pub timeout_sync: u32,
    /// Default priority.
    pub priority_default: i8,
}

/// Inbound service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    /// Reply kind expected by the sender.
    pub command: Command,
    /// Service name, without its NUL terminator.
    pub name: Range<usize>,
    /// Subscription pattern that matched, without its NUL terminator.
    pub pattern: Range<usize>,
    /// Request metadata.
    pub request_info: Range<usize>,
    /// Request body.
    pub request: Range<usize>,
    /// Remaining timeout (ms).
    pub timeout: u32,
    /// Request priority.
    pub priority: i8,
    /// Correlation token.
    pub trans_id: TransId,
    /// Sender identifier, passed back verbatim on return/forward.
    pub destination: Range<usize>,
}

/// Response payload delivered by RECV_ASYNC or RETURN_SYNC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    /// Response metadata.
    pub response_info: Range<usize>,
    /// Response body.
    pub response: Range<usize>,
    /// Correlation token.
    pub trans_id: TransId,
}

/// One decoded inbound record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Handshake reply.
    Init(InitRecord),
    /// Request to dispatch to a handler.
    Send(SendRecord),
    /// Reply to `recv_async` or `send_sync`.
    Response(ResponseRecord),
    /// Reply to `send_async`.
    ReturnAsync(TransId),
    /// Reply to `mcast_async`.
    ReturnsAsync(Vec<TransId>),
    /// Liveness check that must be echoed.
    Keepalive,
}

impl Record {
    /// Whether this record ends a poll.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Record::Send(_) | Record::Keepalive)
    }
}

/// A record together with the number of bytes it occupied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The record.
    pub record: Record,
    /// Bytes consumed from the front of the input.
    pub length: usize,
}

/// Decode the record at the front of `data`.
///
/// Trailing bytes after the record are left alone; whether they are legal is
/// up to the caller.
///
/// # Errors
///
/// Returns a desync error for an unknown tag or a field extending past the
/// end of `data`.
pub fn decode(data: &[u8]) -> Result<Decoded> {
    let mut cursor = Cursor::new(data);
    let tag = cursor.tag()?;

    let record = match MessageTag::from_u32(tag) {
        Some(MessageTag::Init) => Record::Init(InitRecord {
            prefix: cursor.string()?,
            timeout_async: cursor.u32()?,
            timeout_sync: cursor.u32()?,
            priority_default: cursor.i8()?,
        }),
        Some(tag @ (MessageTag::SendAsync | MessageTag::SendSync)) => {
            let command = if tag == MessageTag::SendAsync {
                Command::Async
            } else {
                Command::Sync
            };
            Record::Send(SendRecord {
                command,
                name: cursor.string()?,
                pattern: cursor.string()?,
                request_info: cursor.padded()?,
                request: cursor.padded()?,
                timeout: cursor.u32()?,
                priority: cursor.i8()?,
                trans_id: cursor.trans_id()?,
                destination: cursor.sized()?,
            })
        }
        Some(MessageTag::RecvAsync | MessageTag::ReturnSync) => {
            Record::Response(ResponseRecord {
                response_info: cursor.padded()?,
                response: cursor.padded()?,
                trans_id: cursor.trans_id()?,
            })
        }
        Some(MessageTag::ReturnAsync) => Record::ReturnAsync(cursor.trans_id()?),
        Some(MessageTag::ReturnsAsync) => {
            let count = cursor.u32()? as usize;
            if count.saturating_mul(TRANS_ID_SIZE) > cursor.remaining() {
                return Err(ApiError::desync());
            }
            let trans_ids = (0..count)
                .map(|_| cursor.trans_id())
                .collect::<Result<Vec<_>>>()?;
            Record::ReturnsAsync(trans_ids)
        }
        Some(MessageTag::Keepalive) => Record::Keepalive,
        None => {
            tracing::error!("unknown inbound record tag {}", tag);
            return Err(ApiError::desync());
        }
    };

    Ok(Decoded {
        record,
        length: cursor.position(),
    })
}
