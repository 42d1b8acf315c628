//! Codec module - encoding of outbound commands.
//!
//! The peer reads commands as external-term-format terms:
//!
//! - [`TermEncoder`] - appends individual terms to a [`Buffer`](crate::protocol::Buffer)
//! - [`OutboundCommand`] - one complete command, encoded with its framing
//!
//! # Example
//!
//! ```
//! use cloudi_api::codec::OutboundCommand;
//! use cloudi_api::protocol::Buffer;
//! use cloudi_api::transport::Framing;
//!
//! let mut buffer = Buffer::new(64, 1024);
//! OutboundCommand::Subscribe { pattern: "/jobs/*" }
//!     .encode(&mut buffer, Framing::LengthPrefixed)?;
//!
//! // Four reserved bytes for the frame length, then the version marker.
//! assert_eq!(buffer.as_slice()[4], 131);
//! # Ok::<(), cloudi_api::ApiError>(())
//! ```

mod command;
mod term;

pub use command::{OutboundCommand, SendKind};
pub use term::{strip_version, TermEncoder, MAX_ATOM_LENGTH, VERSION};
