//! Minimal external-term-format encoder.
//!
//! Only the term shapes the outbound commands need are supported: atoms,
//! small tuples, strings, binaries, and integers. The encoding matches what
//! the peer's `binary_to_term` accepts:
//!
//! | Term      | Tag                 | Layout                          |
//! |-----------|---------------------|---------------------------------|
//! | version   | 131                 |                                 |
//! | atom      | `ATOM_EXT` 100      | u16 length, latin-1 bytes       |
//! | tuple     | `SMALL_TUPLE_EXT` 104 | u8 arity                      |
//! | string    | `STRING_EXT` 107    | u16 length, bytes               |
//! | binary    | `BINARY_EXT` 109    | u32 length, bytes               |
//! | integer   | 97 / 98 / 110       | u8 / i32 / sign + LE digits     |
//!
//! # Example
//!
//! ```
//! use cloudi_api::codec::TermEncoder;
//! use cloudi_api::protocol::Buffer;
//!
//! let mut buffer = Buffer::new(64, 1024);
//! TermEncoder::new(&mut buffer).version()?.atom("init")?;
//! assert_eq!(buffer.as_slice(), &[131, 100, 0, 4, b'i', b'n', b'i', b't']);
//! # Ok::<(), cloudi_api::ApiError>(())
//! ```

use crate::error::{ApiError, Result};
use crate::protocol::Buffer;

/// Version marker that starts every encoded term.
pub const VERSION: u8 = 131;

const SMALL_INTEGER_EXT: u8 = 97;
const INTEGER_EXT: u8 = 98;
const ATOM_EXT: u8 = 100;
const SMALL_TUPLE_EXT: u8 = 104;
const NIL_EXT: u8 = 106;
const STRING_EXT: u8 = 107;
const LIST_EXT: u8 = 108;
const BINARY_EXT: u8 = 109;
const SMALL_BIG_EXT: u8 = 110;

/// Longest atom the peer accepts.
pub const MAX_ATOM_LENGTH: usize = 255;

/// Smallest value encoded as `INTEGER_EXT` (28-bit signed).
const INTEGER_MIN: i64 = -(1 << 27);
/// Largest value encoded as `INTEGER_EXT` (28-bit signed).
const INTEGER_MAX: i64 = (1 << 27) - 1;

/// Appends terms to a [`Buffer`].
///
/// Each method returns `&mut Self` so calls chain with `?`.
pub struct TermEncoder<'a> {
    buffer: &'a mut Buffer,
}

impl<'a> TermEncoder<'a> {
    /// Encode onto the end of `buffer`.
    pub fn new(buffer: &'a mut Buffer) -> Self {
        Self { buffer }
    }

    /// Version marker.
    pub fn version(&mut self) -> Result<&mut Self> {
        self.buffer.put_u8(VERSION)?;
        Ok(self)
    }

    /// Atom.
    pub fn atom(&mut self, name: &str) -> Result<&mut Self> {
        if name.len() > MAX_ATOM_LENGTH {
            return Err(ApiError::Encode(format!(
                "atom of {} bytes exceeds {}",
                name.len(),
                MAX_ATOM_LENGTH
            )));
        }
        self.buffer.put_u8(ATOM_EXT)?;
        self.buffer.put_u16(name.len() as u16)?;
        self.buffer.extend_from_slice(name.as_bytes())?;
        Ok(self)
    }

    /// Tuple header; the next `arity` terms are its elements.
    pub fn tuple_header(&mut self, arity: usize) -> Result<&mut Self> {
        let arity = u8::try_from(arity)
            .map_err(|_| ApiError::Encode(format!("tuple arity {arity} too large")))?;
        self.buffer.put_u8(SMALL_TUPLE_EXT)?;
        self.buffer.put_u8(arity)?;
        Ok(self)
    }

    /// String (a list of bytes on the peer side).
    ///
    /// The bytes are written as given; they need not be UTF-8.
    pub fn string(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        if bytes.is_empty() {
            self.buffer.put_u8(NIL_EXT)?;
        } else if let Ok(length) = u16::try_from(bytes.len()) {
            self.buffer.put_u8(STRING_EXT)?;
            self.buffer.put_u16(length)?;
            self.buffer.extend_from_slice(bytes)?;
        } else {
            self.buffer.put_u8(LIST_EXT)?;
            self.buffer.put_u32(length_u32(bytes.len())?)?;
            for &byte in bytes {
                self.buffer.put_u8(SMALL_INTEGER_EXT)?;
                self.buffer.put_u8(byte)?;
            }
            self.buffer.put_u8(NIL_EXT)?;
        }
        Ok(self)
    }

    /// Binary with explicit length.
    pub fn binary(&mut self, data: &[u8]) -> Result<&mut Self> {
        let length = length_u32(data.len())?;
        self.buffer.reserve(self.buffer.len() + 5 + data.len())?;
        self.buffer.put_u8(BINARY_EXT)?;
        self.buffer.put_u32(length)?;
        self.buffer.extend_from_slice(data)?;
        Ok(self)
    }

    /// Unsigned integer.
    pub fn ulong(&mut self, value: u64) -> Result<&mut Self> {
        if value < 256 {
            self.buffer.put_u8(SMALL_INTEGER_EXT)?;
            self.buffer.put_u8(value as u8)?;
        } else if value <= INTEGER_MAX as u64 {
            self.buffer.put_u8(INTEGER_EXT)?;
            self.buffer.put_u32(value as u32)?;
        } else {
            self.big(value, false)?;
        }
        Ok(self)
    }

    /// Signed integer.
    pub fn long(&mut self, value: i64) -> Result<&mut Self> {
        if (0..256).contains(&value) {
            self.buffer.put_u8(SMALL_INTEGER_EXT)?;
            self.buffer.put_u8(value as u8)?;
        } else if (INTEGER_MIN..=INTEGER_MAX).contains(&value) {
            self.buffer.put_u8(INTEGER_EXT)?;
            self.buffer.put_u32(value as i32 as u32)?;
        } else {
            self.big(value.unsigned_abs(), value < 0)?;
        }
        Ok(self)
    }

    /// Bytes that are already a valid encoded term (without version).
    pub fn raw(&mut self, data: &[u8]) -> Result<&mut Self> {
        self.buffer.extend_from_slice(data)?;
        Ok(self)
    }

    fn big(&mut self, magnitude: u64, negative: bool) -> Result<()> {
        let digits = magnitude.to_le_bytes();
        let count = digits.iter().rposition(|&d| d != 0).map_or(0, |i| i + 1);
        self.buffer.put_u8(SMALL_BIG_EXT)?;
        self.buffer.put_u8(count as u8)?;
        self.buffer.put_u8(u8::from(negative))?;
        self.buffer.extend_from_slice(&digits[..count])?;
        Ok(())
    }
}

fn length_u32(length: usize) -> Result<u32> {
    u32::try_from(length)
        .map_err(|_| ApiError::Encode(format!("length {length} does not fit in 32 bits")))
}

/// Skip the version marker of an encoded term, returning the term body.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] if `data` does not start with [`VERSION`].
pub fn strip_version(data: &[u8]) -> Result<&[u8]> {
    match data.split_first() {
        Some((&VERSION, body)) => Ok(body),
        Some((&other, _)) => Err(ApiError::Decode(format!(
            "expected version marker {VERSION}, found {other}"
        ))),
        None => Err(ApiError::Decode("empty term".to_string())),
    }
}
