//! Client builder and dispatch loop.
//!
//! The [`ClientBuilder`] configures buffer limits and produces a connected
//! [`Client`]. The [`Client`] manages the lifecycle:
//! 1. Send `init` and wait for the peer's handshake reply
//! 2. Subscribe handlers to patterns
//! 3. Poll: read records, dispatch requests to handlers, reply
//! 4. Issue its own requests (`send_sync`, `send_async`, ...) as needed
//!
//! One client owns one channel and is driven by a single thread; every call
//! blocks until the channel yields what it is waiting for.
//!
//! # Example
//!
//! ```no_run
//! use cloudi_api::{Client, Request};
//! use cloudi_api::handler::HandlerResult;
//!
//! fn hello(_client: &mut Client, request: &Request) -> HandlerResult {
//!     request.reply("hello")
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::initialize(0)?;
//!     client.subscribe("hello/get", hello)?;
//!
//!     // Serve requests until the peer stops the process.
//!     client.poll(None)?;
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::os::fd::{FromRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::codec::{OutboundCommand, SendKind};
use crate::control::{
    fatal, register_flush_on_exit, Config, CHANNEL_FD_OFFSET, INITIAL_BUFFER_SIZE,
};
use crate::error::{ApiError, Result};
use crate::handler::{
    Forward, Handler, HandlerResult, Outcome, Request, Response, SubscriptionTable,
};
use crate::protocol::{
    decode, Buffer, Command, Decoded, Record, TransId, ABSOLUTE_MAX_BUFFER_SIZE,
};
use crate::transport::{Channel, Framing};

/// Default upper bound for every engine buffer.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = ABSOLUTE_MAX_BUFFER_SIZE;

/// Wait between handshake polls.
const INIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Terminal record produced by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Handshake completed.
    Init,
    /// Response to `send_sync` or `recv_async`.
    Response(Response),
    /// Token assigned to a `send_async`.
    TransId(TransId),
    /// Tokens assigned to an `mcast_async`.
    TransIds(Vec<TransId>),
}

/// Builder for configuring and creating a client.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    initial_buffer_size: usize,
    max_buffer_size: usize,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            initial_buffer_size: INITIAL_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }

    /// Set the starting capacity of each buffer.
    ///
    /// Default: 32768
    pub fn initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    /// Set the size no buffer may grow beyond.
    ///
    /// Values above [`ABSOLUTE_MAX_BUFFER_SIZE`] are clamped.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size.min(ABSOLUTE_MAX_BUFFER_SIZE);
        self
    }

    /// Open the channel for `thread_index` described by the environment and
    /// complete the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidInput`] if the configuration is missing or
    /// the channel descriptor is not open, or any error of the handshake.
    pub fn initialize(self, thread_index: u32) -> Result<Client> {
        let config = Config::from_env()?;
        let fd = i32::try_from(thread_index)
            .ok()
            .and_then(|index| CHANNEL_FD_OFFSET.checked_add(index))
            .ok_or(ApiError::InvalidInput("thread index out of range"))?;

        // SAFETY: F_GETFD only inspects the descriptor table.
        if unsafe { libc::fcntl(fd, libc::F_GETFD) } < 0 {
            return Err(ApiError::InvalidInput("channel descriptor is not open"));
        }
        // SAFETY: the descriptor is open and was handed to this thread by
        // the launching environment; nothing else in the process owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let channel = Channel::new(fd, config.framing(), config.buffer_size as usize);
        self.connect(channel)
    }

    /// Complete the handshake over an already open channel.
    pub fn connect(self, channel: Channel) -> Result<Client> {
        register_flush_on_exit();

        let buffer = || Buffer::new(self.initial_buffer_size, self.max_buffer_size);
        let mut client = Client {
            channel,
            subscriptions: SubscriptionTable::new(),
            send_buffer: buffer(),
            recv_buffer: buffer(),
            call_buffer: buffer(),
            prefix: Bytes::new(),
            timeout_async: 0,
            timeout_sync: 0,
            priority_default: 0,
            response_info: Bytes::new(),
            response: Bytes::new(),
            trans_ids: Vec::new(),
        };

        client.send_command(OutboundCommand::Init)?;
        loop {
            match client.poll(Some(INIT_POLL_INTERVAL)) {
                Ok(Reply::Init) => break,
                Ok(_) => return Err(ApiError::UnexpectedReply("init")),
                Err(ApiError::Timeout) => continue,
                Err(error) => return Err(error),
            }
        }

        tracing::debug!(
            prefix = ?client.prefix,
            timeout_async = client.timeout_async,
            timeout_sync = client.timeout_sync,
            priority_default = client.priority_default,
            "initialized"
        );
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected worker instance.
pub struct Client {
    /// Channel to the peer.
    channel: Channel,
    /// Pattern to handler queues.
    subscriptions: SubscriptionTable,
    /// Outbound command being written.
    send_buffer: Buffer,
    /// Inbound bytes not yet decoded.
    recv_buffer: Buffer,
    /// Copy of the request being dispatched.
    call_buffer: Buffer,
    prefix: Bytes,
    timeout_async: u32,
    timeout_sync: u32,
    priority_default: i8,
    response_info: Bytes,
    response: Bytes,
    trans_ids: Vec<TransId>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect thread `thread_index` with default settings.
    pub fn initialize(thread_index: u32) -> Result<Self> {
        ClientBuilder::new().initialize(thread_index)
    }

    /// Number of worker threads the process should start.
    pub fn thread_count() -> Result<u32> {
        crate::control::thread_count()
    }

    /// Prefix the peer assigned to this process.
    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Prefix, if it is valid UTF-8.
    pub fn prefix_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.prefix).ok()
    }

    /// Default timeout for asynchronous sends (ms).
    #[inline]
    pub fn timeout_async(&self) -> u32 {
        self.timeout_async
    }

    /// Default timeout for synchronous sends (ms).
    #[inline]
    pub fn timeout_sync(&self) -> u32 {
        self.timeout_sync
    }

    /// Default priority.
    #[inline]
    pub fn priority_default(&self) -> i8 {
        self.priority_default
    }

    /// Metadata of the last response received.
    #[inline]
    pub fn response_info(&self) -> &Bytes {
        &self.response_info
    }

    /// Body of the last response received.
    #[inline]
    pub fn response(&self) -> &Bytes {
        &self.response
    }

    /// Tokens from the last completed exchange.
    #[inline]
    pub fn trans_ids(&self) -> &[TransId] {
        &self.trans_ids
    }

    /// First token from the last completed exchange.
    #[inline]
    pub fn trans_id(&self) -> Option<TransId> {
        self.trans_ids.first().copied()
    }

    /// Framing of the channel.
    #[inline]
    pub fn framing(&self) -> Framing {
        self.channel.framing()
    }

    /// Route requests matching `prefix + pattern` to `handler`.
    ///
    /// Subscribing the same pattern again adds another handler; requests are
    /// then spread across them in turn.
    pub fn subscribe<F>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(&mut Client, &Request) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_handler(pattern, Arc::new(handler))
    }

    /// Route requests matching `prefix + pattern` to a shared handler.
    pub fn subscribe_handler(&mut self, pattern: &str, handler: Arc<dyn Handler>) -> Result<()> {
        let full = self.full_pattern(pattern);
        self.subscriptions.insert(&full, handler);
        tracing::debug!(pattern = %String::from_utf8_lossy(&full), "subscribe");
        self.send_command(OutboundCommand::Subscribe { pattern })
    }

    /// Remove every handler of `prefix + pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::FunctionParameter`] if the pattern is not
    /// subscribed; nothing is sent in that case.
    pub fn unsubscribe(&mut self, pattern: &str) -> Result<()> {
        let full = self.full_pattern(pattern);
        if !self.subscriptions.erase(&full) {
            return Err(ApiError::FunctionParameter);
        }
        tracing::debug!(pattern = %String::from_utf8_lossy(&full), "unsubscribe");
        self.send_command(OutboundCommand::Unsubscribe { pattern })
    }

    fn full_pattern(&self, pattern: &str) -> Vec<u8> {
        [&self.prefix[..], pattern.as_bytes()].concat()
    }

    /// Send `request` to `name` without waiting for the response.
    pub fn send_async(&mut self, name: &str, request: &[u8]) -> Result<TransId> {
        self.send_async_with(name, &[], request, 0, self.priority_default)
    }

    /// [`send_async`](Self::send_async) with metadata, timeout and priority.
    ///
    /// A `timeout` of 0 uses [`timeout_async`](Self::timeout_async).
    pub fn send_async_with(
        &mut self,
        name: &str,
        request_info: &[u8],
        request: &[u8],
        timeout: u32,
        priority: i8,
    ) -> Result<TransId> {
        let timeout = or_default(timeout, self.timeout_async);
        self.send(SendKind::Async, name, request_info, request, timeout, priority)?;
        match self.poll(None)? {
            Reply::TransId(trans_id) => Ok(trans_id),
            _ => Err(ApiError::UnexpectedReply("send_async")),
        }
    }

    /// Send `request` to `name` and wait for the response.
    pub fn send_sync(&mut self, name: &str, request: &[u8]) -> Result<Response> {
        self.send_sync_with(name, &[], request, 0, self.priority_default)
    }

    /// [`send_sync`](Self::send_sync) with metadata, timeout and priority.
    ///
    /// A `timeout` of 0 uses [`timeout_sync`](Self::timeout_sync).
    pub fn send_sync_with(
        &mut self,
        name: &str,
        request_info: &[u8],
        request: &[u8],
        timeout: u32,
        priority: i8,
    ) -> Result<Response> {
        let timeout = or_default(timeout, self.timeout_sync);
        self.send(SendKind::Sync, name, request_info, request, timeout, priority)?;
        match self.poll(None)? {
            Reply::Response(response) => Ok(response),
            _ => Err(ApiError::UnexpectedReply("send_sync")),
        }
    }

    /// Send `request` to every subscriber of `name`.
    pub fn mcast_async(&mut self, name: &str, request: &[u8]) -> Result<Vec<TransId>> {
        self.mcast_async_with(name, &[], request, 0, self.priority_default)
    }

    /// [`mcast_async`](Self::mcast_async) with metadata, timeout and priority.
    pub fn mcast_async_with(
        &mut self,
        name: &str,
        request_info: &[u8],
        request: &[u8],
        timeout: u32,
        priority: i8,
    ) -> Result<Vec<TransId>> {
        let timeout = or_default(timeout, self.timeout_async);
        self.send(SendKind::McastAsync, name, request_info, request, timeout, priority)?;
        match self.poll(None)? {
            Reply::TransIds(trans_ids) => Ok(trans_ids),
            _ => Err(ApiError::UnexpectedReply("mcast_async")),
        }
    }

    /// Redirect `request` as described by `forward`.
    ///
    /// Inside a handler, return [`Outcome::Replied`] afterwards (or return
    /// [`Outcome::Forward`] instead of calling this).
    pub fn forward(
        &mut self,
        command: Command,
        request: &Request,
        forward: &Forward,
    ) -> Result<()> {
        let trans_id = request.trans_id();
        self.send_command(OutboundCommand::Forward {
            command,
            name: &forward.name,
            request_info: &forward.request_info,
            request: &forward.request,
            timeout: forward.timeout,
            priority: forward.priority,
            trans_id: &trans_id,
            destination: request.destination(),
        })
    }

    /// Forward an asynchronous request.
    pub fn forward_async(&mut self, request: &Request, forward: &Forward) -> Result<()> {
        self.forward(Command::Async, request, forward)
    }

    /// Forward a synchronous request.
    pub fn forward_sync(&mut self, request: &Request, forward: &Forward) -> Result<()> {
        self.forward(Command::Sync, request, forward)
    }

    /// Answer `request` with `response_info` and `response`.
    pub fn return_(
        &mut self,
        command: Command,
        request: &Request,
        response_info: &[u8],
        response: &[u8],
    ) -> Result<()> {
        let trans_id = request.trans_id();
        self.send_command(OutboundCommand::Return {
            command,
            name: request.name(),
            pattern: request.pattern(),
            response_info,
            response,
            timeout: request.timeout(),
            trans_id: &trans_id,
            destination: request.destination(),
        })
    }

    /// Answer an asynchronous request.
    pub fn return_async(
        &mut self,
        request: &Request,
        response_info: &[u8],
        response: &[u8],
    ) -> Result<()> {
        self.return_(Command::Async, request, response_info, response)
    }

    /// Answer a synchronous request.
    pub fn return_sync(
        &mut self,
        request: &Request,
        response_info: &[u8],
        response: &[u8],
    ) -> Result<()> {
        self.return_(Command::Sync, request, response_info, response)
    }

    /// Collect an asynchronous response.
    ///
    /// `None` takes whichever response is available first. A `timeout` of 0
    /// uses [`timeout_sync`](Self::timeout_sync).
    pub fn recv_async(&mut self, timeout: u32, trans_id: Option<TransId>) -> Result<Response> {
        let timeout = or_default(timeout, self.timeout_sync);
        let trans_id = trans_id.unwrap_or(TransId::NULL);
        self.send_command(OutboundCommand::RecvAsync {
            timeout,
            trans_id: &trans_id,
        })?;
        match self.poll(None)? {
            Reply::Response(response) => Ok(response),
            _ => Err(ApiError::UnexpectedReply("recv_async")),
        }
    }

    /// Process inbound records until a terminal one arrives.
    ///
    /// Requests are dispatched to their handlers along the way. `None` waits
    /// indefinitely; otherwise each wait for more data is bounded by
    /// `timeout` and [`ApiError::Timeout`] is returned when it elapses.
    ///
    /// A desynchronized channel terminates the process.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Reply> {
        match self.poll_request(timeout) {
            Err(error) if error.is_desync() => fatal(&error),
            result => result,
        }
    }

    fn poll_request(&mut self, timeout: Option<Duration>) -> Result<Reply> {
        loop {
            if self.recv_buffer.is_empty() {
                if !self.channel.readable(timeout)? {
                    return Err(ApiError::Timeout);
                }
                self.channel.recv(&mut self.recv_buffer)?;
                if self.recv_buffer.is_empty() {
                    return Err(ApiError::desync());
                }
            }
            if let Some(reply) = self.step()? {
                return Ok(reply);
            }
        }
    }

    /// Decode and act on the record at the front of the receive buffer.
    fn step(&mut self) -> Result<Option<Reply>> {
        let Decoded { record, length } = decode(self.recv_buffer.as_slice())?;
        let leftover = self.recv_buffer.len() - length;
        if leftover > 0 && (record.is_terminal() || self.framing() == Framing::LengthPrefixed) {
            tracing::error!(length, leftover, "record did not consume its frame");
            return Err(ApiError::desync());
        }

        match record {
            Record::Send(send) => {
                self.call_buffer
                    .copy_from(&self.recv_buffer.as_slice()[..length])?;
                self.recv_buffer.consume(length);
                let request = Request::from_record(&send, self.call_buffer.take());
                self.dispatch(&request)?;
                Ok(None)
            }
            Record::Keepalive => {
                tracing::trace!("keepalive");
                self.send_command(OutboundCommand::Keepalive)?;
                self.recv_buffer.consume(length);
                if leftover > 0 && self.channel.readable(Some(Duration::ZERO))? {
                    self.channel.recv(&mut self.recv_buffer)?;
                }
                Ok(None)
            }
            Record::Init(init) => {
                let data = self.recv_buffer.take();
                self.prefix = data.slice(init.prefix);
                self.timeout_async = init.timeout_async;
                self.timeout_sync = init.timeout_sync;
                self.priority_default = init.priority_default;
                Ok(Some(Reply::Init))
            }
            Record::Response(record) => {
                let data = self.recv_buffer.take();
                self.response_info = data.slice(record.response_info);
                self.response = data.slice(record.response);
                self.trans_ids = vec![record.trans_id];
                Ok(Some(Reply::Response(Response {
                    info: self.response_info.clone(),
                    body: self.response.clone(),
                    trans_id: record.trans_id,
                })))
            }
            Record::ReturnAsync(trans_id) => {
                self.recv_buffer.clear();
                self.clear_response();
                self.trans_ids = vec![trans_id];
                Ok(Some(Reply::TransId(trans_id)))
            }
            Record::ReturnsAsync(trans_ids) => {
                self.recv_buffer.clear();
                self.clear_response();
                self.trans_ids = trans_ids.clone();
                Ok(Some(Reply::TransIds(trans_ids)))
            }
        }
    }

    fn clear_response(&mut self) {
        self.response_info = Bytes::new();
        self.response = Bytes::new();
    }

    /// Run the handler for `request` and send the reply it asked for.
    fn dispatch(&mut self, request: &Request) -> Result<()> {
        let command = request.command();
        let pattern = String::from_utf8_lossy(request.pattern()).into_owned();
        let Some(handler) = self.subscriptions.find(request.pattern()) else {
            tracing::error!(%pattern, "no handler subscribed");
            return self.return_(command, request, &[], &[]);
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.call(self, request)));
        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(error)) => {
                tracing::error!(%pattern, %error, "handler failed");
                Outcome::Normal
            }
            Err(payload) => {
                tracing::error!(
                    %pattern,
                    panic = panic_message(&*payload),
                    "handler panicked"
                );
                Outcome::Normal
            }
        };

        let sent = match outcome {
            Outcome::Normal => self.return_(command, request, &[], &[]),
            Outcome::Return { info, body } => self.return_(command, request, &info, &body),
            Outcome::Forward(forward) => self.forward(command, request, &forward),
            Outcome::Replied => Ok(()),
        };
        if let Err(error) = &sent {
            tracing::error!(%pattern, %error, "reply not sent");
        }
        sent
    }

    fn send(
        &mut self,
        kind: SendKind,
        name: &str,
        request_info: &[u8],
        request: &[u8],
        timeout: u32,
        priority: i8,
    ) -> Result<()> {
        self.send_command(OutboundCommand::Send {
            kind,
            name,
            request_info,
            request,
            timeout,
            priority,
        })
    }

    fn send_command(&mut self, command: OutboundCommand<'_>) -> Result<()> {
        command.encode(&mut self.send_buffer, self.channel.framing())?;
        self.channel.send(&mut self.send_buffer)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("channel", &self.channel)
            .field("prefix", &self.prefix)
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

fn or_default(timeout: u32, default: u32) -> u32 {
    if timeout == 0 {
        default
    } else {
        timeout
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
