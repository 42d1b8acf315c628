//! Blocking channel to the peer.
//!
//! A [`Channel`] owns one pre-opened descriptor and moves whole buffers across
//! it. Readiness is checked with `poll(2)` before reads so callers can bound
//! how long they wait; the reads and writes themselves block.
//!
//! # Example
//!
//! ```no_run
//! use std::os::fd::OwnedFd;
//! use std::os::unix::net::UnixStream;
//! use std::time::Duration;
//!
//! use cloudi_api::protocol::Buffer;
//! use cloudi_api::transport::{Channel, Framing};
//!
//! let (ours, _theirs) = UnixStream::pair()?;
//! let channel = Channel::new(OwnedFd::from(ours), Framing::LengthPrefixed, 4096);
//!
//! let mut buffer = Buffer::new(4096, 1 << 20);
//! if channel.readable(Some(Duration::from_millis(100)))? {
//!     channel.recv(&mut buffer)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;

use crate::error::{ApiError, PollErrorKind, ReadErrorKind, Result, WriteErrorKind};
use crate::protocol::{Buffer, FRAME_HEADER_SIZE};

/// How message boundaries are marked on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Every message carries a 4-byte big-endian length header.
    LengthPrefixed,
    /// Raw bytes; boundaries follow from the record layout.
    Streaming,
}

/// One end of the worker's connection to the peer.
#[derive(Debug)]
pub struct Channel {
    file: File,
    framing: Framing,
    chunk_size: usize,
}

impl Channel {
    /// Wrap a connected descriptor.
    ///
    /// `chunk_size` bounds each read in streaming mode; it is raised to at
    /// least one byte.
    pub fn new(fd: OwnedFd, framing: Framing, chunk_size: usize) -> Self {
        Self {
            file: File::from(fd),
            framing,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Framing mode.
    #[inline]
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Per-read chunk size in streaming mode.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Wait until the channel has data (or a hangup) to read.
    ///
    /// `None` waits indefinitely; a zero duration only checks.
    /// Returns `false` if the wait elapsed first.
    pub fn readable(&self, timeout: Option<Duration>) -> Result<bool> {
        let timeout_ms = match timeout {
            None => -1,
            Some(duration) => i32::try_from(duration.as_millis()).unwrap_or(i32::MAX),
        };
        let mut fds = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        };

        // SAFETY: `fds` is a valid pollfd for the duration of the call and
        // the descriptor is owned by `self.file`.
        let ready = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if ready < 0 {
            let error = io::Error::last_os_error();
            return Err(ApiError::Poll(PollErrorKind::from_io(&error)));
        }
        Ok(ready > 0 && fds.revents != 0)
    }

    /// Write all of `data`, retrying partial writes.
    pub fn write_exact(&self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match (&self.file).write(&data[written..]) {
                Ok(0) => return Err(ApiError::Write(WriteErrorKind::Closed)),
                Ok(count) => written += count,
                Err(error) => return Err(ApiError::Write(WriteErrorKind::from_io(&error))),
            }
        }
        if written > data.len() {
            return Err(ApiError::Write(WriteErrorKind::Overflow));
        }
        Ok(())
    }

    /// Fill all of `data`, retrying partial reads.
    pub fn read_exact(&self, data: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < data.len() {
            match (&self.file).read(&mut data[filled..]) {
                Ok(0) => return Err(ApiError::Read(ReadErrorKind::Closed)),
                Ok(count) => filled += count,
                Err(error) => return Err(ApiError::Read(ReadErrorKind::from_io(&error))),
            }
        }
        if filled > data.len() {
            return Err(ApiError::Read(ReadErrorKind::Overflow));
        }
        Ok(())
    }

    /// Send the contents of `buffer`.
    ///
    /// With length-prefixed framing the first four bytes of `buffer` are
    /// reserved for the header and are overwritten with the big-endian length
    /// of the rest.
    pub fn send(&self, buffer: &mut Buffer) -> Result<()> {
        if self.framing == Framing::LengthPrefixed {
            let payload = buffer
                .len()
                .checked_sub(FRAME_HEADER_SIZE)
                .ok_or(ApiError::InvalidInput("outbound buffer lacks a frame header"))?;
            let length = u32::try_from(payload)
                .map_err(|_| ApiError::Write(WriteErrorKind::FileTooBig))?;
            buffer.as_mut_slice()[..FRAME_HEADER_SIZE].copy_from_slice(&length.to_be_bytes());
        }
        tracing::trace!(bytes = buffer.len(), "sending");
        self.write_exact(buffer.as_slice())
    }

    /// Receive one inbound unit, appending it to `buffer`.
    ///
    /// Length-prefixed mode appends exactly one framed payload. Streaming
    /// mode appends whatever is available: it keeps reading while each read
    /// fills a whole chunk and more data is immediately pending.
    pub fn recv(&self, buffer: &mut Buffer) -> Result<()> {
        match self.framing {
            Framing::LengthPrefixed => self.recv_frame(buffer),
            Framing::Streaming => self.recv_stream(buffer),
        }
    }

    fn recv_frame(&self, buffer: &mut Buffer) -> Result<()> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.read_exact(&mut header)?;
        let length = u32::from_be_bytes(header) as usize;
        tracing::trace!(bytes = length, "receiving frame");

        buffer.fill_with(length, |tail| {
            self.read_exact(tail)?;
            Ok(tail.len())
        })?;
        Ok(())
    }

    fn recv_stream(&self, buffer: &mut Buffer) -> Result<()> {
        let start = buffer.len();
        loop {
            let count = buffer.fill_with(self.chunk_size, |tail| {
                match (&self.file).read(tail) {
                    Ok(count) => Ok(count),
                    Err(error) => Err(ApiError::Read(ReadErrorKind::from_io(&error))),
                }
            })?;

            if count == 0 {
                if buffer.len() == start {
                    return Err(ApiError::Read(ReadErrorKind::Closed));
                }
                break;
            }
            if count < self.chunk_size || !self.readable(Some(Duration::ZERO))? {
                break;
            }
        }
        tracing::trace!(bytes = buffer.len() - start, "received stream data");
        Ok(())
    }
}

impl AsFd for Channel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn pair(framing: Framing, chunk_size: usize) -> (Channel, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        (Channel::new(OwnedFd::from(ours), framing, chunk_size), theirs)
    }

    #[test]
    fn test_send_patches_length_header() {
        let (channel, mut peer) = pair(Framing::LengthPrefixed, 64);
        let mut buffer = Buffer::new(16, 1024);
        buffer.extend_from_slice(&[0, 0, 0, 0, b'a', b'b', b'c']).unwrap();

        channel.send(&mut buffer).unwrap();

        let mut received = [0u8; 7];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_send_without_header_room_is_rejected() {
        let (channel, _peer) = pair(Framing::LengthPrefixed, 64);
        let mut buffer = Buffer::new(16, 1024);
        buffer.extend_from_slice(&[1, 2]).unwrap();
        assert!(matches!(
            channel.send(&mut buffer),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_streaming_send_is_raw() {
        let (channel, mut peer) = pair(Framing::Streaming, 64);
        let mut buffer = Buffer::new(16, 1024);
        buffer.extend_from_slice(b"raw").unwrap();

        channel.send(&mut buffer).unwrap();

        let mut received = [0u8; 3];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"raw");
    }

    #[test]
    fn test_recv_frame_appends_payload() {
        let (channel, mut peer) = pair(Framing::LengthPrefixed, 4);
        peer.write_all(&[0, 0, 0, 5]).unwrap();
        peer.write_all(b"hello").unwrap();

        let mut buffer = Buffer::new(2, 1024);
        buffer.extend_from_slice(b">").unwrap();
        channel.recv(&mut buffer).unwrap();

        assert_eq!(buffer.as_slice(), b">hello");
    }

    #[test]
    fn test_recv_frame_beyond_maximum() {
        let (channel, mut peer) = pair(Framing::LengthPrefixed, 4);
        peer.write_all(&[0, 0, 1, 0]).unwrap();

        let mut buffer = Buffer::new(16, 64);
        let result = channel.recv(&mut buffer);

        assert!(matches!(result, Err(ApiError::OutOfMemory { .. })));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_recv_reports_closed_channel() {
        let (channel, peer) = pair(Framing::LengthPrefixed, 4);
        drop(peer);
        let mut buffer = Buffer::new(16, 64);
        assert!(matches!(
            channel.recv(&mut buffer),
            Err(ApiError::Read(ReadErrorKind::Closed))
        ));

        let (channel, peer) = pair(Framing::Streaming, 4);
        drop(peer);
        assert!(matches!(
            channel.recv(&mut buffer),
            Err(ApiError::Read(ReadErrorKind::Closed))
        ));
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let (channel, mut peer) = pair(Framing::LengthPrefixed, 4);
        peer.write_all(&[0, 0, 0, 8, 1, 2]).unwrap();
        drop(peer);

        let mut buffer = Buffer::new(16, 64);
        assert!(matches!(
            channel.recv(&mut buffer),
            Err(ApiError::Read(ReadErrorKind::Closed))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stream_accumulates_full_chunks() {
        let (channel, mut peer) = pair(Framing::Streaming, 4);
        peer.write_all(b"0123456789").unwrap();

        let mut buffer = Buffer::new(4, 1024);
        channel.recv(&mut buffer).unwrap();

        assert_eq!(buffer.as_slice(), b"0123456789");
    }

    #[test]
    fn test_readable_times_out() {
        let (channel, mut peer) = pair(Framing::Streaming, 4);
        assert!(!channel.readable(Some(Duration::ZERO)).unwrap());
        assert!(!channel.readable(Some(Duration::from_millis(10))).unwrap());

        peer.write_all(b"x").unwrap();
        assert!(channel.readable(Some(Duration::ZERO)).unwrap());
    }
}
