//! Inbound wire format primitives.
//!
//! Records sent by the peer are a flat sequence of fields, not tagged terms:
//! ```text
//! ┌──────────┬───────────────────────────────────────────┐
//! │ Tag      │ Fields (per record kind)                  │
//! │ 4 bytes  │ u32 / i8 / sized span / padded span / id  │
//! │ uint32 NE│                                           │
//! └──────────┴───────────────────────────────────────────┘
//! ```
//!
//! Integers are in the host's native byte order. A *sized* span is a `u32`
//! length followed by that many bytes (strings include their NUL). A *padded*
//! span is a `u32` length, that many bytes and one pad byte that is skipped.
//!
//! The length prefix used by the `tcp` framing is big-endian and is handled
//! by the transport, not here.

use std::fmt;
use std::ops::Range;

use crate::error::{ApiError, Result};

/// Size of the record tag in bytes.
pub const TAG_SIZE: usize = 4;

/// Size of a transaction id in bytes.
pub const TRANS_ID_SIZE: usize = 16;

/// Size of the big-endian frame length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Absolute maximum buffer size (~2 GB, max i32).
pub const ABSOLUTE_MAX_BUFFER_SIZE: usize = 2_147_483_647;

/// Tag at the start of every inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageTag {
    /// Handshake reply.
    Init = 1,
    /// Inbound asynchronous request.
    SendAsync = 2,
    /// Inbound synchronous request.
    SendSync = 3,
    /// Reply to `recv_async`.
    RecvAsync = 4,
    /// Reply to `send_async`.
    ReturnAsync = 5,
    /// Reply to `send_sync`.
    ReturnSync = 6,
    /// Reply to `mcast_async`.
    ReturnsAsync = 7,
    /// Liveness check from the peer.
    Keepalive = 8,
}

impl MessageTag {
    /// Map a raw tag to a known record kind.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Init),
            2 => Some(Self::SendAsync),
            3 => Some(Self::SendSync),
            4 => Some(Self::RecvAsync),
            5 => Some(Self::ReturnAsync),
            6 => Some(Self::ReturnSync),
            7 => Some(Self::ReturnsAsync),
            8 => Some(Self::Keepalive),
            _ => None,
        }
    }
}

/// Opaque 16-byte correlation token assigned by the peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransId([u8; TRANS_ID_SIZE]);

impl TransId {
    /// The all-zero token, meaning "any" for `recv_async`.
    pub const NULL: TransId = TransId([0; TRANS_ID_SIZE]);

    /// Wrap raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; TRANS_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from a slice; `None` unless it is exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; TRANS_ID_SIZE]>::try_from(bytes).ok().map(Self)
    }

    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; TRANS_ID_SIZE] {
        &self.0
    }

    /// Check if this is the all-zero token.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == [0; TRANS_ID_SIZE]
    }
}

impl fmt::Display for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransId({self})")
    }
}

/// Bounds-checked reader over an inbound record.
///
/// Every read advances the position and fails with a desync error rather
/// than reading past the end. Spans are returned as offsets so callers can
/// re-resolve them against whichever buffer ends up owning the bytes.
pub struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Start reading at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Consume `count` bytes, returning their offsets.
    pub fn skip(&mut self, count: usize) -> Result<Range<usize>> {
        if count > self.remaining() {
            return Err(ApiError::desync());
        }
        let start = self.position;
        self.position += count;
        Ok(start..self.position)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let range = self.skip(N)?;
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[range]);
        Ok(bytes)
    }

    /// Read the record tag.
    pub fn tag(&mut self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.take::<TAG_SIZE>()?))
    }

    /// Read a native-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_ne_bytes(self.take::<4>()?))
    }

    /// Read an `i8`.
    pub fn i8(&mut self) -> Result<i8> {
        Ok(i8::from_ne_bytes(self.take::<1>()?))
    }

    /// Read a transaction id.
    pub fn trans_id(&mut self) -> Result<TransId> {
        Ok(TransId(self.take::<TRANS_ID_SIZE>()?))
    }

    /// Read a `u32` length followed by that many bytes.
    pub fn sized(&mut self) -> Result<Range<usize>> {
        let size = self.u32()? as usize;
        self.skip(size)
    }

    /// Read a sized string field, leaving its NUL terminator out of the span.
    ///
    /// The bytes are not required to be UTF-8; they are handed back to the
    /// peer exactly as received.
    pub fn string(&mut self) -> Result<Range<usize>> {
        let span = self.sized()?;
        match self.data[span.clone()].last() {
            Some(0) => Ok(span.start..span.end - 1),
            _ => Ok(span),
        }
    }

    /// Read a `u32` length, that many bytes, and one pad byte.
    ///
    /// The pad byte is skipped without being inspected.
    pub fn padded(&mut self) -> Result<Range<usize>> {
        let span = self.sized()?;
        self.skip(1)?;
        Ok(span)
    }
}
