//! Control module - process-level setup around the engine.
//!
//! - [`Config`] - environment variables describing the channel
//! - [`register_flush_on_exit`] / [`fatal`] - exit-time flushing and termination
//!
//! # Workflow
//!
//! 1. The peer starts the process with channel descriptors 3, 4, ... open
//! 2. The program reads [`thread_count`] and starts that many threads
//! 3. Each thread reads [`Config`] and opens descriptor `3 + index`
//! 4. Each thread performs the handshake and enters its poll loop

mod config;
mod exit;

pub use config::{
    thread_count, Config, Protocol, CHANNEL_FD_OFFSET, ENV_BUFFER_SIZE, ENV_PROTOCOL,
    ENV_THREAD_COUNT, INITIAL_BUFFER_SIZE,
};
pub use exit::{fatal, flush_standard_streams, register_flush_on_exit, FlushOnce};
