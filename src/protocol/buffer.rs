//! Bounded growable byte buffer.
//!
//! Wraps a `bytes::BytesMut` and tracks a logical capacity that grows by
//! doubling but never past a hard maximum. Growth beyond the maximum is a
//! recoverable [`ApiError::OutOfMemory`], and the buffer is left untouched.
//!
//! # Example
//!
//! ```
//! use cloudi_api::protocol::Buffer;
//!
//! let mut buffer = Buffer::new(16, 64);
//! buffer.extend_from_slice(b"hello").unwrap();
//! assert_eq!(buffer.as_slice(), b"hello");
//!
//! assert!(buffer.reserve(65).is_err());
//! assert_eq!(buffer.capacity(), 16);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ApiError, Result};

/// Byte buffer with a hard upper bound on its capacity.
///
/// Invariant: `len() <= capacity() <= maximum()`.
pub struct Buffer {
    /// Stored bytes.
    bytes: BytesMut,
    /// Logical capacity granted so far.
    capacity: usize,
    /// Hard upper bound for `capacity`.
    maximum: usize,
}

impl Buffer {
    /// Create a buffer with `initial` capacity (clamped to `maximum`).
    pub fn new(initial: usize, maximum: usize) -> Self {
        let capacity = initial.min(maximum);
        Self {
            bytes: BytesMut::with_capacity(capacity),
            capacity,
            maximum,
        }
    }

    /// Ensure the capacity is at least `size` bytes.
    ///
    /// Grows geometrically, clamped to the maximum.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::OutOfMemory`] if `size` exceeds the maximum.
    pub fn reserve(&mut self, size: usize) -> Result<()> {
        if size <= self.capacity {
            return Ok(());
        }
        if size > self.maximum {
            return Err(ApiError::OutOfMemory {
                requested: size,
                maximum: self.maximum,
            });
        }

        let mut capacity = self.capacity.max(1);
        while capacity < size {
            capacity = capacity.saturating_mul(2);
        }
        let capacity = capacity.min(self.maximum);

        self.bytes.reserve(capacity - self.bytes.len());
        self.capacity = capacity;
        Ok(())
    }

    /// Number of stored bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Logical capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Hard maximum capacity.
    #[inline]
    pub fn maximum(&self) -> usize {
        self.maximum
    }

    /// Stored bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Stored bytes, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Drop all stored bytes, keeping the capacity.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Append bytes to the end.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(self.len() + data.len())?;
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Replace the contents with a copy of `data`.
    pub fn copy_from(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        self.bytes.clear();
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    /// Append a single byte.
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.reserve(self.len() + 1)?;
        self.bytes.put_u8(value);
        Ok(())
    }

    /// Append a big-endian `u16`.
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.reserve(self.len() + 2)?;
        self.bytes.put_u16(value);
        Ok(())
    }

    /// Append a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.reserve(self.len() + 4)?;
        self.bytes.put_u32(value);
        Ok(())
    }

    /// Reserve `count` bytes past the end and let `fill` write into them.
    ///
    /// `fill` returns how many of the offered bytes it actually wrote; only
    /// those are kept. On error nothing is appended.
    pub fn fill_with<F>(&mut self, count: usize, fill: F) -> Result<usize>
    where
        F: FnOnce(&mut [u8]) -> Result<usize>,
    {
        let start = self.len();
        self.reserve(start + count)?;
        self.bytes.resize(start + count, 0);

        match fill(&mut self.bytes[start..]) {
            Ok(written) => {
                let written = written.min(count);
                self.bytes.truncate(start + written);
                Ok(written)
            }
            Err(error) => {
                self.bytes.truncate(start);
                Err(error)
            }
        }
    }

    /// Discard the first `count` bytes, moving the rest to the front.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.len());
        self.bytes.advance(count);
    }

    /// Take all stored bytes out as an immutable `Bytes`.
    ///
    /// The buffer is left empty; its capacity is re-acquired lazily on the
    /// next write.
    pub fn take(&mut self) -> Bytes {
        self.bytes.split().freeze()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("maximum", &self.maximum)
            .finish()
    }
}
