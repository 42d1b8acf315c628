//! Handler module - request handling and dispatch.
//!
//! Provides:
//! - [`SubscriptionTable`] - maps patterns to round-robin handler queues
//! - [`Request`] / [`Outcome`] - what a handler receives and how it answers
//!
//! # Example
//!
//! ```no_run
//! use cloudi_api::{Client, Outcome};
//!
//! # fn main() -> cloudi_api::Result<()> {
//! let mut client = Client::initialize(0)?;
//!
//! client.subscribe("echo", |_client: &mut Client, request: &cloudi_api::Request| {
//!     request.reply(request.request().clone())
//! })?;
//!
//! client.subscribe("sink", |_: &mut Client, _: &cloudi_api::Request| Ok(Outcome::Normal))?;
//!
//! client.poll(None)?;
//! # Ok(())
//! # }
//! ```

mod context;
mod registry;

pub use context::{Forward, Handler, HandlerError, HandlerResult, Outcome, Request, Response};
pub use registry::SubscriptionTable;
