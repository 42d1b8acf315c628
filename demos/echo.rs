//! Echo Worker - simple request/response example.
//!
//! This example demonstrates:
//! - Starting one client per worker thread from the launch environment
//! - Subscribing handlers that reply, forward, or answer directly
//! - Parsing request metadata into a key/value map
//!
//! The process must be started by the service runtime, which provides the
//! channel descriptors and the `CLOUDI_API_INIT_*` variables. Logs go to
//! stderr; set `RUST_LOG=debug` to see the handshake.

use std::thread;

use cloudi_api::handler::HandlerResult;
use cloudi_api::key_value;
use cloudi_api::{ApiError, Client, Outcome, Request};

/// Reply with the request body unchanged.
fn echo(_client: &mut Client, request: &Request) -> HandlerResult {
    request.reply(request.request().clone())
}

/// Reply with the request metadata, one `key=value` per line.
fn headers(_client: &mut Client, request: &Request) -> HandlerResult {
    let mut lines: Vec<String> = key_value::info_key_value_parse(request.request_info())
        .into_iter()
        .flat_map(|(key, values)| values.into_iter().map(move |value| format!("{key}={value}")))
        .collect();
    lines.sort();
    request.reply(lines.join("\n"))
}

/// Hand the request to the echo service of this same process.
fn relay(client: &mut Client, request: &Request) -> HandlerResult {
    let mut target = client.prefix().to_vec();
    target.extend_from_slice(b"echo/get");
    request.forward_to(target)
}

/// Ask another service and reply once its answer is in.
fn lookup(client: &mut Client, request: &Request) -> HandlerResult {
    let response = client.send_sync("/directory/lookup/get", request.request())?;
    client.return_(request.command(), request, &response.info, &response.body)?;
    Ok(Outcome::Replied)
}

fn run(thread_index: u32) -> cloudi_api::Result<()> {
    let mut client = Client::initialize(thread_index)?;
    client.subscribe("echo/get", echo)?;
    client.subscribe("headers/get", headers)?;
    client.subscribe("relay/get", relay)?;
    client.subscribe("lookup/get", lookup)?;

    tracing::info!(
        thread_index,
        prefix = client.prefix_str().unwrap_or_default(),
        "serving"
    );
    loop {
        match client.poll(None) {
            Ok(reply) => tracing::debug!(?reply, "unsolicited reply"),
            Err(ApiError::Timeout) => continue,
            Err(error) => return Err(error),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let workers: Vec<_> = (0..Client::thread_count()?)
        .map(|index| thread::spawn(move || run(index)))
        .collect();

    for worker in workers {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::error!(%error, "worker stopped"),
            Err(_) => tracing::error!("worker panicked"),
        }
    }
    Ok(())
}
