//! Scripted peer for driving a real `Client` over a socket pair.
#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use cloudi_api::codec::OutboundCommand;
use cloudi_api::protocol::{Buffer, MessageTag, FRAME_HEADER_SIZE};
use cloudi_api::transport::{Channel, Framing};
use cloudi_api::{Client, ClientBuilder, TransId};

/// Destination identifier used by every scripted request.
pub const DESTINATION: [u8; 6] = [131, 100, 0, 2, b'p', b'1'];

/// Prefix assigned in the scripted handshake.
pub const PREFIX: &str = "/test/";

/// Route test logs through the test harness; `RUST_LOG` selects levels.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Inbound record laid out the way the peer writes it.
#[derive(Default)]
pub struct RecordWriter {
    bytes: Vec<u8>,
}

impl RecordWriter {
    pub fn new(tag: MessageTag) -> Self {
        let mut writer = Self::default();
        writer.u32(tag as u32);
        writer
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
        self
    }

    pub fn i8(&mut self, value: i8) -> &mut Self {
        self.bytes.extend_from_slice(&value.to_ne_bytes());
        self
    }

    /// NUL-terminated string counted in its size.
    pub fn string(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        let value = value.as_ref();
        self.u32(value.len() as u32 + 1);
        self.bytes.extend_from_slice(value);
        self.bytes.push(0);
        self
    }

    /// Binary followed by one pad byte.
    pub fn padded(&mut self, value: &[u8]) -> &mut Self {
        self.u32(value.len() as u32);
        self.bytes.extend_from_slice(value);
        self.bytes.push(0);
        self
    }

    pub fn sized(&mut self, value: &[u8]) -> &mut Self {
        self.u32(value.len() as u32);
        self.bytes.extend_from_slice(value);
        self
    }

    pub fn trans_id(&mut self, value: TransId) -> &mut Self {
        self.bytes.extend_from_slice(value.as_bytes());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

pub fn init_record() -> Vec<u8> {
    RecordWriter::new(MessageTag::Init)
        .string(PREFIX)
        .u32(5000)
        .u32(6000)
        .i8(0)
        .build()
}

/// A SEND_ASYNC or SEND_SYNC record for `pattern`.
pub fn send_record(tag: MessageTag, pattern: &str, request: &[u8], id: u8) -> Vec<u8> {
    RecordWriter::new(tag)
        .string("/test/service")
        .string(pattern)
        .padded(b"meta")
        .padded(request)
        .u32(2000)
        .i8(-1)
        .trans_id(TransId::new([id; 16]))
        .sized(&DESTINATION)
        .build()
}

pub fn keepalive_record() -> Vec<u8> {
    RecordWriter::new(MessageTag::Keepalive).build()
}

/// The peer end of a channel.
pub struct Peer {
    stream: UnixStream,
    framing: Framing,
}

impl Peer {
    /// Create a connected channel and its peer.
    pub fn pair(framing: Framing, chunk_size: usize) -> (Channel, Peer) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let channel = Channel::new(OwnedFd::from(ours), framing, chunk_size);
        (
            channel,
            Peer {
                stream: theirs,
                framing,
            },
        )
    }

    /// A client that already completed its handshake with this peer.
    pub fn connect(framing: Framing, chunk_size: usize) -> (Client, Peer) {
        init_tracing();
        let (channel, mut peer) = Self::pair(framing, chunk_size);
        peer.write_record(&init_record());
        let client = ClientBuilder::new()
            .initial_buffer_size(chunk_size)
            .connect(channel)
            .unwrap();
        peer.expect(OutboundCommand::Init);
        (client, peer)
    }

    /// Write one record, framed if the channel uses length prefixes.
    pub fn write_record(&mut self, record: &[u8]) {
        if self.framing == Framing::LengthPrefixed {
            self.stream
                .write_all(&(record.len() as u32).to_be_bytes())
                .unwrap();
        }
        self.stream.write_all(record).unwrap();
    }

    /// Write bytes exactly as given.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    /// Read `count` bytes.
    pub fn read(&mut self, count: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; count];
        self.stream.read_exact(&mut bytes).unwrap();
        bytes
    }

    /// Assert the next bytes from the client are exactly `command`.
    pub fn expect(&mut self, command: OutboundCommand<'_>) {
        let mut buffer = Buffer::new(64, 1 << 24);
        command.encode(&mut buffer, self.framing).unwrap();
        let mut expected = buffer.as_slice().to_vec();
        if self.framing == Framing::LengthPrefixed {
            let length = (expected.len() - FRAME_HEADER_SIZE) as u32;
            expected[..FRAME_HEADER_SIZE].copy_from_slice(&length.to_be_bytes());
        }
        let actual = self.read(expected.len());
        assert_eq!(actual, expected, "expected {} command", command.name());
    }

    /// Assert the client has written nothing more.
    pub fn expect_nothing(&mut self) {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Err(error) if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            other => panic!("unexpected output from client: {other:?}"),
        }
        self.stream.set_read_timeout(None).unwrap();
    }

    /// Close the peer end.
    pub fn close(self) {
        drop(self.stream);
    }
}
