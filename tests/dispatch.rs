//! Request dispatch: buffering, handler rotation and handler outcomes.

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudi_api::codec::OutboundCommand;
use cloudi_api::handler::HandlerResult;
use cloudi_api::protocol::MessageTag;
use cloudi_api::transport::Framing;
use cloudi_api::{ApiError, Client, ClientBuilder, Command, Forward, Outcome, Request, TransId};

use support::{init_tracing, keepalive_record, send_record, Peer, RecordWriter, DESTINATION};

const CHUNK: usize = 64;
const WAIT: Option<Duration> = Some(Duration::from_millis(200));

fn expect_return(
    peer: &mut Peer,
    command: Command,
    pattern: &str,
    info: &[u8],
    body: &[u8],
    id: u8,
) {
    peer.expect(OutboundCommand::Return {
        command,
        name: b"/test/service",
        pattern: pattern.as_bytes(),
        response_info: info,
        response: body,
        timeout: 2000,
        trans_id: &TransId::new([id; 16]),
        destination: &DESTINATION,
    });
}

/// A SEND_SYNC record with arbitrary name and pattern bytes.
fn raw_send_record(name: &[u8], pattern: &[u8], id: u8) -> Vec<u8> {
    RecordWriter::new(MessageTag::SendSync)
        .string(name)
        .string(pattern)
        .padded(b"")
        .padded(b"")
        .u32(2000)
        .i8(-1)
        .trans_id(TransId::new([id; 16]))
        .sized(&DESTINATION)
        .build()
}

fn drain(client: &mut Client) {
    assert!(matches!(client.poll(WAIT), Err(ApiError::Timeout)));
}

fn subscribe<F>(client: &mut Client, peer: &mut Peer, pattern: &str, handler: F)
where
    F: Fn(&mut Client, &Request) -> HandlerResult + Send + Sync + 'static,
{
    client.subscribe(pattern, handler).unwrap();
    peer.expect(OutboundCommand::Subscribe { pattern });
}

#[test]
fn test_streamed_records_are_all_dispatched() {
    let (mut client, mut peer) = Peer::connect(Framing::Streaming, CHUNK);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    subscribe(&mut client, &mut peer, "a", move |_: &mut Client, request: &Request| {
        log.lock().unwrap().push(request.request().clone());
        Ok(Outcome::Normal)
    });

    let mut data = send_record(MessageTag::SendAsync, "/test/a", b"first", 1);
    data.extend(send_record(MessageTag::SendAsync, "/test/a", b"second", 2));
    peer.write_raw(&data);
    drain(&mut client);

    assert_eq!(seen.lock().unwrap().as_slice(), [&b"first"[..], &b"second"[..]]);
    expect_return(&mut peer, Command::Async, "/test/a", b"", b"", 1);
    expect_return(&mut peer, Command::Async, "/test/a", b"", b"", 2);
    peer.expect_nothing();
}

#[test]
fn test_handlers_of_one_pattern_take_turns() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    let order = Arc::new(Mutex::new(Vec::new()));
    for index in 1..=3 {
        let log = Arc::clone(&order);
        subscribe(&mut client, &mut peer, "a", move |_: &mut Client, _: &Request| {
            log.lock().unwrap().push(index);
            Ok(Outcome::Normal)
        });
    }

    for id in 1..=4 {
        peer.write_record(&send_record(MessageTag::SendSync, "/test/a", b"", id));
        drain(&mut client);
        expect_return(&mut peer, Command::Sync, "/test/a", b"", b"", id);
    }

    assert_eq!(order.lock().unwrap().as_slice(), &[1, 2, 3, 1]);
}

#[test]
fn test_unsubscribe_removes_every_handler() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    let calls = Arc::new(Mutex::new(0));
    for _ in 0..2 {
        let counter = Arc::clone(&calls);
        subscribe(&mut client, &mut peer, "a", move |_: &mut Client, _: &Request| {
            *counter.lock().unwrap() += 1;
            Ok(Outcome::Normal)
        });
    }

    client.unsubscribe("a").unwrap();
    peer.expect(OutboundCommand::Unsubscribe { pattern: "a" });
    assert!(matches!(
        client.unsubscribe("a"),
        Err(ApiError::FunctionParameter)
    ));
    peer.expect_nothing();

    peer.write_record(&send_record(MessageTag::SendAsync, "/test/a", b"", 5));
    drain(&mut client);

    assert_eq!(*calls.lock().unwrap(), 0);
    expect_return(&mut peer, Command::Async, "/test/a", b"", b"", 5);
}

#[test]
fn test_keepalive_is_echoed_before_buffered_request() {
    let (mut client, mut peer) = Peer::connect(Framing::Streaming, CHUNK);
    subscribe(&mut client, &mut peer, "a", |_: &mut Client, request: &Request| {
        request.reply(request.request().clone())
    });

    let mut data = keepalive_record();
    data.extend(send_record(MessageTag::SendSync, "/test/a", b"echo", 6));
    peer.write_raw(&data);
    drain(&mut client);

    peer.expect(OutboundCommand::Keepalive);
    expect_return(&mut peer, Command::Sync, "/test/a", b"", b"echo", 6);
    peer.expect_nothing();
}

#[test]
fn test_keepalive_alone() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    peer.write_record(&keepalive_record());
    drain(&mut client);

    peer.expect(OutboundCommand::Keepalive);
    peer.expect_nothing();
}

#[test]
fn test_return_outcome_is_sent_verbatim() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    subscribe(&mut client, &mut peer, "a", |_: &mut Client, _: &Request| {
        Ok(Outcome::Return {
            info: "code\0201\0".into(),
            body: "created".into(),
        })
    });

    peer.write_record(&send_record(MessageTag::SendSync, "/test/a", b"new", 7));
    drain(&mut client);

    expect_return(&mut peer, Command::Sync, "/test/a", b"code\0201\0", b"created", 7);
    peer.expect_nothing();
}

#[test]
fn test_forward_outcome_keeps_request_and_destination() {
    let (mut client, mut peer) = Peer::connect(Framing::Streaming, CHUNK);
    subscribe(&mut client, &mut peer, "a", |_: &mut Client, request: &Request| {
        request.forward_to("/next/service")
    });

    peer.write_record(&send_record(MessageTag::SendAsync, "/test/a", b"payload", 8));
    drain(&mut client);

    peer.expect(OutboundCommand::Forward {
        command: Command::Async,
        name: b"/next/service",
        request_info: b"meta",
        request: b"payload",
        timeout: 2000,
        priority: -1,
        trans_id: &TransId::new([8; 16]),
        destination: &DESTINATION,
    });
    peer.expect_nothing();
}

#[test]
fn test_forward_outcome_with_new_content() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    subscribe(&mut client, &mut peer, "a", |_: &mut Client, _: &Request| {
        Ok(Outcome::Forward(Forward {
            name: "/next/service".into(),
            request_info: "".into(),
            request: "rewritten".into(),
            timeout: 300,
            priority: 2,
        }))
    });

    peer.write_record(&send_record(MessageTag::SendSync, "/test/a", b"original", 9));
    drain(&mut client);

    peer.expect(OutboundCommand::Forward {
        command: Command::Sync,
        name: b"/next/service",
        request_info: b"",
        request: b"rewritten",
        timeout: 300,
        priority: 2,
        trans_id: &TransId::new([9; 16]),
        destination: &DESTINATION,
    });
}

#[test]
fn test_direct_reply_is_sent_once() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    subscribe(&mut client, &mut peer, "a", |client: &mut Client, request: &Request| {
        client.return_async(request, b"", b"done")?;
        Ok(Outcome::Replied)
    });

    peer.write_record(&send_record(MessageTag::SendAsync, "/test/a", b"", 10));
    drain(&mut client);

    expect_return(&mut peer, Command::Async, "/test/a", b"", b"done", 10);
    peer.expect_nothing();
}

#[test]
fn test_request_fields_reach_handler() {
    let (mut client, mut peer) = Peer::connect(Framing::Streaming, CHUNK);
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    subscribe(&mut client, &mut peer, "a", move |_: &mut Client, request: &Request| {
        *slot.lock().unwrap() = Some(request.clone());
        Ok(Outcome::Normal)
    });

    peer.write_record(&send_record(MessageTag::SendSync, "/test/a", b"body", 11));
    drain(&mut client);
    expect_return(&mut peer, Command::Sync, "/test/a", b"", b"", 11);

    let guard = seen.lock().unwrap();
    let request = guard.as_ref().unwrap();
    assert_eq!(request.command(), Command::Sync);
    assert_eq!(request.name(), b"/test/service");
    assert_eq!(request.pattern(), b"/test/a");
    assert_eq!(request.pattern_str(), Some("/test/a"));
    assert_eq!(&request.request_info()[..], b"meta");
    assert_eq!(&request.request()[..], b"body");
    assert_eq!(request.timeout(), 2000);
    assert_eq!(request.priority(), -1);
    assert_eq!(request.trans_id(), TransId::new([11; 16]));
    assert_eq!(&request.destination()[..], &DESTINATION);
}

#[test]
fn test_name_bytes_are_echoed_unchanged() {
    let (mut client, mut peer) = Peer::connect(Framing::LengthPrefixed, CHUNK);
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    subscribe(&mut client, &mut peer, "a", move |_: &mut Client, request: &Request| {
        *slot.lock().unwrap() = Some(request.clone());
        Ok(Outcome::Normal)
    });

    peer.write_record(&raw_send_record(b"/x\xff", b"/test/a", 12));
    drain(&mut client);

    let guard = seen.lock().unwrap();
    let request = guard.as_ref().unwrap();
    assert_eq!(request.name(), b"/x\xff");
    assert_eq!(request.name_str(), None);

    peer.expect(OutboundCommand::Return {
        command: Command::Sync,
        name: b"/x\xff",
        pattern: b"/test/a",
        response_info: b"",
        response: b"",
        timeout: 2000,
        trans_id: &TransId::new([12; 16]),
        destination: &DESTINATION,
    });
    peer.expect_nothing();
}

#[test]
fn test_pattern_under_non_utf8_prefix_is_routed() {
    init_tracing();
    let (channel, mut peer) = Peer::pair(Framing::Streaming, CHUNK);
    peer.write_record(
        &RecordWriter::new(MessageTag::Init)
            .string(b"/t\xfe/")
            .u32(5000)
            .u32(6000)
            .i8(0)
            .build(),
    );
    let mut client = ClientBuilder::new().connect(channel).unwrap();
    peer.expect(OutboundCommand::Init);
    assert_eq!(client.prefix(), b"/t\xfe/");
    assert_eq!(client.prefix_str(), None);

    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    subscribe(&mut client, &mut peer, "a", move |_: &mut Client, _: &Request| {
        *counter.lock().unwrap() += 1;
        Ok(Outcome::Normal)
    });

    peer.write_record(&raw_send_record(b"/test/service", b"/t\xfe/a", 13));
    drain(&mut client);

    assert_eq!(*calls.lock().unwrap(), 1);
    peer.expect(OutboundCommand::Return {
        command: Command::Sync,
        name: b"/test/service",
        pattern: b"/t\xfe/a",
        response_info: b"",
        response: b"",
        timeout: 2000,
        trans_id: &TransId::new([13; 16]),
        destination: &DESTINATION,
    });
}
