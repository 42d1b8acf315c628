//! Transport module - the blocking descriptor shared with the peer.
//!
//! Provides:
//! - [`Channel`] - readiness waits plus exact reads and writes
//! - [`Framing`] - length-prefixed or streaming message boundaries

mod channel;

pub use channel::{Channel, Framing};
