//! Error types for cloudi-api.
//!
//! Transport failures keep the underlying OS condition (`EAGAIN`, `EBADF`,
//! ...) as a distinct kind instead of collapsing into a generic I/O error,
//! and every error maps to a stable numeric code via [`ApiError::code`].

use std::io;

use thiserror::Error;

/// Failure while reading from the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadErrorKind {
    /// `EAGAIN` / `EWOULDBLOCK`.
    #[error("would block")]
    WouldBlock,
    /// `EBADF`.
    #[error("bad file descriptor")]
    BadDescriptor,
    /// `EFAULT`.
    #[error("bad address")]
    Fault,
    /// `EINTR`.
    #[error("interrupted")]
    Interrupted,
    /// `EINVAL`.
    #[error("invalid argument")]
    InvalidArgument,
    /// `EIO`.
    #[error("I/O error")]
    Io,
    /// `EISDIR`.
    #[error("is a directory")]
    IsDirectory,
    /// The peer closed the channel (read returned zero bytes).
    #[error("end of stream")]
    Closed,
    /// More bytes were transferred than requested.
    #[error("read overflow")]
    Overflow,
    /// An inbound record did not match its declared layout.
    #[error("read underflow")]
    Underflow,
    /// Any other OS error number.
    #[error("unknown read error (errno {0})")]
    Unknown(i32),
}

/// Failure while writing to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteErrorKind {
    /// `EAGAIN` / `EWOULDBLOCK`.
    #[error("would block")]
    WouldBlock,
    /// `EBADF`.
    #[error("bad file descriptor")]
    BadDescriptor,
    /// `EFAULT`.
    #[error("bad address")]
    Fault,
    /// `EFBIG`.
    #[error("file too big")]
    FileTooBig,
    /// `EINTR`.
    #[error("interrupted")]
    Interrupted,
    /// `EINVAL`.
    #[error("invalid argument")]
    InvalidArgument,
    /// `EIO`.
    #[error("I/O error")]
    Io,
    /// `ENOSPC`.
    #[error("no space left on device")]
    NoSpace,
    /// `EPIPE`.
    #[error("broken pipe")]
    BrokenPipe,
    /// A write accepted zero bytes.
    #[error("channel closed")]
    Closed,
    /// More bytes were transferred than requested.
    #[error("write overflow")]
    Overflow,
    /// Any other OS error number.
    #[error("unknown write error (errno {0})")]
    Unknown(i32),
}

/// Failure while waiting for channel readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PollErrorKind {
    /// `EBADF`.
    #[error("bad file descriptor")]
    BadDescriptor,
    /// `EFAULT`.
    #[error("bad address")]
    Fault,
    /// `EINTR`.
    #[error("interrupted")]
    Interrupted,
    /// `EINVAL`.
    #[error("invalid argument")]
    InvalidArgument,
    /// `ENOMEM`.
    #[error("out of memory")]
    OutOfMemory,
    /// Any other OS error number.
    #[error("unknown poll error (errno {0})")]
    Unknown(i32),
}

impl ReadErrorKind {
    /// Classify an I/O error returned by `read(2)`.
    pub fn from_io(error: &io::Error) -> Self {
        match error.raw_os_error() {
            Some(libc::EAGAIN) => Self::WouldBlock,
            Some(libc::EBADF) => Self::BadDescriptor,
            Some(libc::EFAULT) => Self::Fault,
            Some(libc::EINTR) => Self::Interrupted,
            Some(libc::EINVAL) => Self::InvalidArgument,
            Some(libc::EIO) => Self::Io,
            Some(libc::EISDIR) => Self::IsDirectory,
            Some(errno) => Self::Unknown(errno),
            None => match error.kind() {
                io::ErrorKind::UnexpectedEof => Self::Closed,
                io::ErrorKind::WouldBlock => Self::WouldBlock,
                io::ErrorKind::Interrupted => Self::Interrupted,
                _ => Self::Unknown(0),
            },
        }
    }
}

impl WriteErrorKind {
    /// Classify an I/O error returned by `write(2)`.
    pub fn from_io(error: &io::Error) -> Self {
        match error.raw_os_error() {
            Some(libc::EAGAIN) => Self::WouldBlock,
            Some(libc::EBADF) => Self::BadDescriptor,
            Some(libc::EFAULT) => Self::Fault,
            Some(libc::EFBIG) => Self::FileTooBig,
            Some(libc::EINTR) => Self::Interrupted,
            Some(libc::EINVAL) => Self::InvalidArgument,
            Some(libc::EIO) => Self::Io,
            Some(libc::ENOSPC) => Self::NoSpace,
            Some(libc::EPIPE) => Self::BrokenPipe,
            Some(errno) => Self::Unknown(errno),
            None => match error.kind() {
                io::ErrorKind::WriteZero => Self::Closed,
                io::ErrorKind::WouldBlock => Self::WouldBlock,
                io::ErrorKind::Interrupted => Self::Interrupted,
                io::ErrorKind::BrokenPipe => Self::BrokenPipe,
                _ => Self::Unknown(0),
            },
        }
    }
}

impl PollErrorKind {
    /// Classify an I/O error returned by `poll(2)`.
    pub fn from_io(error: &io::Error) -> Self {
        match error.raw_os_error() {
            Some(libc::EBADF) => Self::BadDescriptor,
            Some(libc::EFAULT) => Self::Fault,
            Some(libc::EINTR) => Self::Interrupted,
            Some(libc::EINVAL) => Self::InvalidArgument,
            Some(libc::ENOMEM) => Self::OutOfMemory,
            Some(errno) => Self::Unknown(errno),
            None => Self::Unknown(0),
        }
    }
}

/// Main error type for all API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed configuration.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// A bounded poll elapsed before a reply arrived.
    #[error("timeout")]
    Timeout,

    /// A caller-supplied argument was rejected (e.g. unknown pattern).
    #[error("invalid function parameter")]
    FunctionParameter,

    /// Reading from the channel failed.
    #[error("read error: {0}")]
    Read(ReadErrorKind),

    /// Writing to the channel failed.
    #[error("write error: {0}")]
    Write(WriteErrorKind),

    /// Waiting for channel readiness failed.
    #[error("poll error: {0}")]
    Poll(PollErrorKind),

    /// A command could not be encoded.
    #[error("term encode error: {0}")]
    Encode(String),

    /// A destination identifier could not be decoded.
    #[error("term decode error: {0}")]
    Decode(String),

    /// A buffer would have grown beyond its maximum size.
    #[error("out of memory: {requested} bytes requested, maximum is {maximum}")]
    OutOfMemory {
        /// Capacity that was asked for.
        requested: usize,
        /// Hard maximum of the buffer.
        maximum: usize,
    },

    /// The peer answered with a record of the wrong kind.
    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

impl ApiError {
    /// Error signalling that the inbound byte stream lost alignment.
    pub(crate) fn desync() -> Self {
        Self::Read(ReadErrorKind::Underflow)
    }

    /// Whether the channel's byte alignment can no longer be trusted.
    pub fn is_desync(&self) -> bool {
        matches!(self, Self::Read(ReadErrorKind::Underflow))
    }

    /// Stable numeric status code, also used as the process exit status on
    /// fatal errors.
    pub fn code(&self) -> i32 {
        match self {
            Self::Timeout => 1,
            Self::InvalidInput(_) => 2,
            Self::FunctionParameter => 3,
            Self::OutOfMemory { .. } => 4,
            Self::Encode(_) => 5,
            Self::Decode(_) => 6,
            Self::UnexpectedReply(_) => 7,
            Self::Read(kind) => match kind {
                ReadErrorKind::WouldBlock => 10,
                ReadErrorKind::BadDescriptor => 11,
                ReadErrorKind::Fault => 12,
                ReadErrorKind::Interrupted => 13,
                ReadErrorKind::InvalidArgument => 14,
                ReadErrorKind::Io => 15,
                ReadErrorKind::IsDirectory => 16,
                ReadErrorKind::Closed => 17,
                ReadErrorKind::Overflow => 18,
                ReadErrorKind::Underflow => 19,
                ReadErrorKind::Unknown(_) => 20,
            },
            Self::Write(kind) => match kind {
                WriteErrorKind::WouldBlock => 30,
                WriteErrorKind::BadDescriptor => 31,
                WriteErrorKind::Fault => 32,
                WriteErrorKind::FileTooBig => 33,
                WriteErrorKind::Interrupted => 34,
                WriteErrorKind::InvalidArgument => 35,
                WriteErrorKind::Io => 36,
                WriteErrorKind::NoSpace => 37,
                WriteErrorKind::BrokenPipe => 38,
                WriteErrorKind::Closed => 39,
                WriteErrorKind::Overflow => 40,
                WriteErrorKind::Unknown(_) => 41,
            },
            Self::Poll(kind) => match kind {
                PollErrorKind::BadDescriptor => 50,
                PollErrorKind::Fault => 51,
                PollErrorKind::Interrupted => 52,
                PollErrorKind::InvalidArgument => 53,
                PollErrorKind::OutOfMemory => 54,
                PollErrorKind::Unknown(_) => 55,
            },
        }
    }
}

/// Result type alias using ApiError.
pub type Result<T> = std::result::Result<T, ApiError>;
