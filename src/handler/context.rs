//! Request context for handlers.
//!
//! A handler receives the inbound [`Request`] and reports how it was
//! answered through an [`Outcome`]:
//! - `Normal` - the engine replies with an empty response
//! - `Return` - the engine replies with the given payload
//! - `Forward` - the engine redirects the request to another service
//! - `Replied` - the handler already answered through the [`Client`]
//!
//! Returning an error from a handler is treated like `Normal` after the
//! error is logged, so the sender always gets a reply.
//!
//! # Example
//!
//! ```
//! use cloudi_api::handler::HandlerResult;
//! use cloudi_api::{Client, Request};
//!
//! fn echo(_client: &mut Client, request: &Request) -> HandlerResult {
//!     if request.request().is_empty() {
//!         return request.forward_to("/fallback/echo");
//!     }
//!     request.reply(request.request().clone())
//! }
//! ```

use bytes::Bytes;

use crate::client::Client;
use crate::protocol::{Command, SendRecord, TransId};

/// Error type handlers may return; it is logged, never sent.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Outcome, HandlerError>;

/// Trait for request handlers.
///
/// Implemented for every `Fn(&mut Client, &Request) -> HandlerResult`, so
/// plain functions and closures can be subscribed directly.
pub trait Handler: Send + Sync + 'static {
    /// Handle one inbound request.
    fn call(&self, client: &mut Client, request: &Request) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut Client, &Request) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, client: &mut Client, request: &Request) -> HandlerResult {
        self(client, request)
    }
}

/// How a handler answered its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reply with an empty response.
    Normal,
    /// Reply with this response.
    Return {
        /// Response metadata.
        info: Bytes,
        /// Response body.
        body: Bytes,
    },
    /// Redirect the request instead of replying.
    Forward(Forward),
    /// The handler already sent a return or forward itself.
    Replied,
}

/// Redirect target and content for [`Outcome::Forward`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    /// Service name to forward to.
    pub name: Bytes,
    /// Request metadata.
    pub request_info: Bytes,
    /// Request body.
    pub request: Bytes,
    /// Timeout (ms).
    pub timeout: u32,
    /// Priority.
    pub priority: i8,
}

/// An inbound service request.
///
/// Byte fields share one allocation holding the record, so cloning them is
/// cheap. Name and pattern are kept exactly as the peer sent them.
#[derive(Debug, Clone)]
pub struct Request {
    command: Command,
    name: Bytes,
    pattern: Bytes,
    request_info: Bytes,
    request: Bytes,
    timeout: u32,
    priority: i8,
    trans_id: TransId,
    destination: Bytes,
}

impl Request {
    /// Resolve a decoded record against the bytes it was decoded from.
    pub(crate) fn from_record(record: &SendRecord, data: Bytes) -> Self {
        Self {
            command: record.command,
            name: data.slice(record.name.clone()),
            pattern: data.slice(record.pattern.clone()),
            request_info: data.slice(record.request_info.clone()),
            request: data.slice(record.request.clone()),
            timeout: record.timeout,
            priority: record.priority,
            trans_id: record.trans_id,
            destination: data.slice(record.destination.clone()),
        }
    }

    /// Build a request by hand, e.g. for exercising handlers directly.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        command: Command,
        name: impl Into<Bytes>,
        pattern: impl Into<Bytes>,
        request_info: impl Into<Bytes>,
        request: impl Into<Bytes>,
        timeout: u32,
        priority: i8,
        trans_id: TransId,
        destination: impl Into<Bytes>,
    ) -> Self {
        Self {
            command,
            name: name.into(),
            pattern: pattern.into(),
            request_info: request_info.into(),
            request: request.into(),
            timeout,
            priority,
            trans_id,
            destination: destination.into(),
        }
    }

    /// Reply kind expected by the sender.
    #[inline]
    pub fn command(&self) -> Command {
        self.command
    }

    /// Service name the request was sent to.
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Service name, if it is valid UTF-8.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Subscription pattern that matched.
    #[inline]
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Subscription pattern, if it is valid UTF-8.
    pub fn pattern_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.pattern).ok()
    }

    /// Request metadata.
    #[inline]
    pub fn request_info(&self) -> &Bytes {
        &self.request_info
    }

    /// Request body.
    #[inline]
    pub fn request(&self) -> &Bytes {
        &self.request
    }

    /// Remaining timeout (ms).
    #[inline]
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Priority.
    #[inline]
    pub fn priority(&self) -> i8 {
        self.priority
    }

    /// Correlation token.
    #[inline]
    pub fn trans_id(&self) -> TransId {
        self.trans_id
    }

    /// Encoded sender identifier.
    #[inline]
    pub fn destination(&self) -> &Bytes {
        &self.destination
    }

    /// Reply with `body` and empty metadata.
    pub fn reply(&self, body: impl Into<Bytes>) -> HandlerResult {
        self.reply_with(Bytes::new(), body)
    }

    /// Reply with metadata and body.
    pub fn reply_with(&self, info: impl Into<Bytes>, body: impl Into<Bytes>) -> HandlerResult {
        Ok(Outcome::Return {
            info: info.into(),
            body: body.into(),
        })
    }

    /// Forward this request unchanged to `name`.
    pub fn forward_to(&self, name: impl Into<Bytes>) -> HandlerResult {
        Ok(Outcome::Forward(Forward {
            name: name.into(),
            request_info: self.request_info.clone(),
            request: self.request.clone(),
            timeout: self.timeout,
            priority: self.priority,
        }))
    }
}

/// Response to a synchronous send or `recv_async`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// Response metadata.
    pub info: Bytes,
    /// Response body.
    pub body: Bytes,
    /// Correlation token of the request answered.
    pub trans_id: TransId,
}

impl Response {
    /// Check if the peer reported a timeout (empty body and null token).
    pub fn is_timeout(&self) -> bool {
        self.info.is_empty() && self.body.is_empty() && self.trans_id.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, MessageTag, Record, RecordBuilder};

    fn request() -> Request {
        Request::new(
            Command::Sync,
            "/svc/name",
            "/svc/*",
            &b"info"[..],
            &b"body"[..],
            500,
            2,
            TransId::new([4; 16]),
            vec![131, 106],
        )
    }

    #[test]
    fn test_from_record_resolves_fields() {
        let data = RecordBuilder::new(MessageTag::SendAsync)
            .string("/n")
            .string("/p")
            .padded(b"ri")
            .padded(b"rq")
            .u32(10)
            .i8(-1)
            .trans_id(TransId::new([2; 16]))
            .sized(&[131, 106])
            .build();
        let Record::Send(record) = decode(&data).unwrap().record else {
            panic!("expected send");
        };

        let request = Request::from_record(&record, Bytes::from(data));

        assert_eq!(request.command(), Command::Async);
        assert_eq!(request.name(), b"/n");
        assert_eq!(request.pattern(), b"/p");
        assert_eq!(request.name_str(), Some("/n"));
        assert_eq!(&request.request_info()[..], b"ri");
        assert_eq!(&request.request()[..], b"rq");
        assert_eq!(request.timeout(), 10);
        assert_eq!(request.priority(), -1);
        assert_eq!(request.trans_id(), TransId::new([2; 16]));
        assert_eq!(&request.destination()[..], &[131, 106]);
    }

    #[test]
    fn test_from_record_keeps_name_bytes() {
        let data = RecordBuilder::new(MessageTag::SendSync)
            .string(b"/x\xff")
            .string(b"/p\xfe")
            .padded(b"")
            .padded(b"")
            .u32(10)
            .i8(0)
            .trans_id(TransId::NULL)
            .sized(&[131, 106])
            .build();
        let Record::Send(record) = decode(&data).unwrap().record else {
            panic!("expected send");
        };

        let request = Request::from_record(&record, Bytes::from(data));

        assert_eq!(request.name(), b"/x\xff");
        assert_eq!(request.pattern(), b"/p\xfe");
        assert_eq!(request.name_str(), None);
        assert_eq!(request.pattern_str(), None);
    }

    #[test]
    fn test_reply_helpers() {
        let request = request();
        assert_eq!(
            request.reply(&b"ok"[..]).unwrap(),
            Outcome::Return {
                info: Bytes::new(),
                body: Bytes::from_static(b"ok"),
            }
        );
        assert_eq!(
            request.reply_with(&b"i"[..], &b"b"[..]).unwrap(),
            Outcome::Return {
                info: Bytes::from_static(b"i"),
                body: Bytes::from_static(b"b"),
            }
        );
    }

    #[test]
    fn test_forward_to_keeps_request_content() {
        let Outcome::Forward(forward) = request().forward_to("/other").unwrap() else {
            panic!("expected forward");
        };
        assert_eq!(forward.name, "/other");
        assert_eq!(&forward.request_info[..], b"info");
        assert_eq!(&forward.request[..], b"body");
        assert_eq!(forward.timeout, 500);
        assert_eq!(forward.priority, 2);
    }

    #[test]
    fn test_response_timeout() {
        assert!(Response::default().is_timeout());
        let response = Response {
            body: Bytes::from_static(b"x"),
            ..Response::default()
        };
        assert!(!response.is_timeout());
    }
}
