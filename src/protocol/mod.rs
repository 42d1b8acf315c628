//! Protocol module - buffers, inbound wire format, and record decoding.
//!
//! This module implements the peer-to-worker half of the protocol:
//! - Bounded growable buffer shared by the send, receive, and call paths
//! - Bounds-checked cursor over native-endian record fields
//! - Inbound record decoding (INIT, SEND, RETURN, KEEPALIVE, ...)

mod buffer;
mod record;
mod wire_format;

pub use buffer::Buffer;
pub use record::{
    decode, Command, Decoded, InitRecord, Record, ResponseRecord, SendRecord,
};
pub use wire_format::{
    Cursor, MessageTag, TransId, ABSOLUTE_MAX_BUFFER_SIZE, FRAME_HEADER_SIZE, TAG_SIZE,
    TRANS_ID_SIZE,
};

#[cfg(test)]
pub(crate) use record::tests::RecordBuilder;
