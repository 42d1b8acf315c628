//! Outbound commands.
//!
//! Every command is a version marker followed by either a bare atom
//! (`init`, `keepalive`) or a tuple whose first element is the command atom.
//! When the channel uses length-prefixed framing, four placeholder bytes are
//! written first; the transport fills them in when sending.

use super::term::{strip_version, TermEncoder};
use crate::error::Result;
use crate::protocol::{Buffer, Command, TransId, FRAME_HEADER_SIZE};
use crate::transport::Framing;

/// Flavour of a plain outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendKind {
    /// `send_async`: one receiver, reply collected later.
    Async,
    /// `send_sync`: one receiver, reply awaited.
    Sync,
    /// `mcast_async`: every subscriber receives it.
    McastAsync,
}

impl SendKind {
    /// Command atom for this kind.
    pub fn atom(self) -> &'static str {
        match self {
            SendKind::Async => "send_async",
            SendKind::Sync => "send_sync",
            SendKind::McastAsync => "mcast_async",
        }
    }
}

impl Command {
    /// Forward command atom for this reply kind.
    pub fn forward_atom(self) -> &'static str {
        match self {
            Command::Async => "forward_async",
            Command::Sync => "forward_sync",
        }
    }

    /// Return command atom for this reply kind.
    pub fn return_atom(self) -> &'static str {
        match self {
            Command::Async => "return_async",
            Command::Sync => "return_sync",
        }
    }
}

/// A command sent from the worker to the peer.
#[derive(Debug, Clone, Copy)]
pub enum OutboundCommand<'a> {
    /// Handshake request.
    Init,
    /// Liveness echo.
    Keepalive,
    /// Register interest in a pattern (without the prefix).
    Subscribe {
        /// Pattern suffix.
        pattern: &'a str,
    },
    /// Drop interest in a pattern (without the prefix).
    Unsubscribe {
        /// Pattern suffix.
        pattern: &'a str,
    },
    /// New request to a named service.
    Send {
        /// Delivery flavour.
        kind: SendKind,
        /// Destination service name.
        name: &'a str,
        /// Request metadata.
        request_info: &'a [u8],
        /// Request body.
        request: &'a [u8],
        /// Timeout (ms).
        timeout: u32,
        /// Priority.
        priority: i8,
    },
    /// Redirect an inbound request to another service.
    Forward {
        /// Reply kind of the request being forwarded.
        command: Command,
        /// New destination service name.
        name: &'a [u8],
        /// Request metadata.
        request_info: &'a [u8],
        /// Request body.
        request: &'a [u8],
        /// Timeout (ms).
        timeout: u32,
        /// Priority.
        priority: i8,
        /// Correlation token of the inbound request.
        trans_id: &'a TransId,
        /// Encoded sender identifier, with its version marker.
        destination: &'a [u8],
    },
    /// Answer an inbound request.
    Return {
        /// Reply kind of the request being answered.
        command: Command,
        /// Service name of the request, as received.
        name: &'a [u8],
        /// Pattern that matched the request, as received.
        pattern: &'a [u8],
        /// Response metadata.
        response_info: &'a [u8],
        /// Response body.
        response: &'a [u8],
        /// Timeout (ms).
        timeout: u32,
        /// Correlation token of the inbound request.
        trans_id: &'a TransId,
        /// Encoded sender identifier, with its version marker.
        destination: &'a [u8],
    },
    /// Collect an asynchronous reply.
    RecvAsync {
        /// Timeout (ms).
        timeout: u32,
        /// Token to wait for; [`TransId::NULL`] means any.
        trans_id: &'a TransId,
    },
}

impl OutboundCommand<'_> {
    /// Command atom.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundCommand::Init => "init",
            OutboundCommand::Keepalive => "keepalive",
            OutboundCommand::Subscribe { .. } => "subscribe",
            OutboundCommand::Unsubscribe { .. } => "unsubscribe",
            OutboundCommand::Send { kind, .. } => kind.atom(),
            OutboundCommand::Forward { command, .. } => command.forward_atom(),
            OutboundCommand::Return { command, .. } => command.return_atom(),
            OutboundCommand::RecvAsync { .. } => "recv_async",
        }
    }

    /// Encode into `buffer`, replacing its contents.
    ///
    /// # Errors
    ///
    /// Returns an encode error for malformed input, a decode error if a
    /// destination identifier lacks its version marker, or
    /// [`ApiError::OutOfMemory`](crate::ApiError::OutOfMemory) if the buffer
    /// cannot hold the command.
    pub fn encode(&self, buffer: &mut Buffer, framing: Framing) -> Result<()> {
        buffer.clear();
        if framing == Framing::LengthPrefixed {
            buffer.extend_from_slice(&[0; FRAME_HEADER_SIZE])?;
        }

        let mut encoder = TermEncoder::new(buffer);
        encoder.version()?;

        match *self {
            OutboundCommand::Init | OutboundCommand::Keepalive => {
                encoder.atom(self.name())?;
            }
            OutboundCommand::Subscribe { pattern } | OutboundCommand::Unsubscribe { pattern } => {
                encoder
                    .tuple_header(2)?
                    .atom(self.name())?
                    .string(pattern.as_bytes())?;
            }
            OutboundCommand::Send {
                name,
                request_info,
                request,
                timeout,
                priority,
                ..
            } => {
                encoder
                    .tuple_header(6)?
                    .atom(self.name())?
                    .string(name.as_bytes())?
                    .binary(request_info)?
                    .binary(request)?
                    .ulong(u64::from(timeout))?
                    .long(i64::from(priority))?;
            }
            OutboundCommand::Forward {
                name,
                request_info,
                request,
                timeout,
                priority,
                trans_id,
                destination,
                ..
            } => {
                let destination = strip_version(destination)?;
                encoder
                    .tuple_header(8)?
                    .atom(self.name())?
                    .string(name)?
                    .binary(request_info)?
                    .binary(request)?
                    .ulong(u64::from(timeout))?
                    .long(i64::from(priority))?
                    .binary(trans_id.as_bytes())?
                    .raw(destination)?;
            }
            OutboundCommand::Return {
                name,
                pattern,
                response_info,
                response,
                timeout,
                trans_id,
                destination,
                ..
            } => {
                let destination = strip_version(destination)?;
                encoder
                    .tuple_header(8)?
                    .atom(self.name())?
                    .string(name)?
                    .string(pattern)?
                    .binary(response_info)?
                    .binary(response)?
                    .ulong(u64::from(timeout))?
                    .binary(trans_id.as_bytes())?
                    .raw(destination)?;
            }
            OutboundCommand::RecvAsync { timeout, trans_id } => {
                encoder
                    .tuple_header(3)?
                    .atom(self.name())?
                    .ulong(u64::from(timeout))?
                    .binary(trans_id.as_bytes())?;
            }
        }
        Ok(())
    }
}
