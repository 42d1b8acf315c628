//! # cloudi-api
//!
//! Rust worker API for the CloudI service protocol.
//!
//! A worker process is started by the peer with one pre-opened channel per
//! thread. Each thread connects a [`Client`], subscribes handlers to
//! patterns, and polls: inbound requests are dispatched to handlers and
//! answered, and the worker can send its own requests to other services.
//!
//! ## Architecture
//!
//! - **Inbound** (peer to worker): flat native-endian records, see [`protocol`]
//! - **Outbound** (worker to peer): external-term-format commands, see [`codec`]
//! - **Channel**: blocking descriptor, length-prefixed or streaming, see [`transport`]
//!
//! ## Example
//!
//! ```no_run
//! use cloudi_api::{Client, Outcome, Request};
//!
//! fn main() -> cloudi_api::Result<()> {
//!     let threads = Client::thread_count()?;
//!     let workers: Vec<_> = (0..threads)
//!         .map(|index| {
//!             std::thread::spawn(move || -> cloudi_api::Result<()> {
//!                 let mut client = Client::initialize(index)?;
//!                 client.subscribe("echo/get", |_: &mut Client, request: &Request| {
//!                     request.reply(request.request().clone())
//!                 })?;
//!                 client.subscribe("sink/post", |_: &mut Client, _: &Request| {
//!                     Ok(Outcome::Normal)
//!                 })?;
//!                 loop {
//!                     client.poll(None)?;
//!                 }
//!             })
//!         })
//!         .collect();
//!
//!     for worker in workers {
//!         let _ = worker.join();
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod handler;
pub mod key_value;
pub mod protocol;
pub mod transport;

mod client;

pub use client::{Client, ClientBuilder, Reply, DEFAULT_MAX_BUFFER_SIZE};
pub use error::{ApiError, Result};
pub use handler::{Forward, Handler, Outcome, Request, Response};
pub use protocol::{Command, TransId};
