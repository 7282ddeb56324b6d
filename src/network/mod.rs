//! Request/response dispatch: wraps a per-API payload in the request
//! envelope, decodes a response by stripping `correlation_id` and
//! delegating to the matching per-API decoder, and names the `Connection`
//! capability the offset manager is built against.
//!
//! `Connection` is an interface only — establishing and pooling actual
//! TCP connections to brokers is the concern of an external collaborator
//! (the cluster/coordinator discovery layer), not this crate.

use std::borrow::Cow;

use bytes::{BigEndian, BytesMut};
use futures::future;
use futures::{Future, IntoFuture, Poll};

use errors::{Error, ErrorKind, Result};
use protocol::{
    parse_response_header, ApiKey, CorrelationId, OffsetCommitRequest, OffsetCommitResponse,
    OffsetFetchRequest, OffsetFetchResponse, OffsetRequest, OffsetResponse, Request,
    API_KEY_OFFSETS, API_KEY_OFFSET_COMMIT, API_KEY_OFFSET_FETCH,
};
use protocol::RequestHeader;

/// The per-API payloads this crate can send, each carrying everything
/// `encode_request` needs besides the common envelope fields.
#[derive(Clone, Debug, PartialEq)]
pub enum KafkaRequest {
    Offset(OffsetRequest),
    OffsetCommit(OffsetCommitRequest),
    OffsetFetch(OffsetFetchRequest),
}

impl KafkaRequest {
    pub fn api_key(&self) -> ApiKey {
        match *self {
            KafkaRequest::Offset(_) => API_KEY_OFFSETS,
            KafkaRequest::OffsetCommit(_) => API_KEY_OFFSET_COMMIT,
            KafkaRequest::OffsetFetch(_) => API_KEY_OFFSET_FETCH,
        }
    }

    pub fn api_version(&self) -> i16 {
        match *self {
            KafkaRequest::Offset(ref req) => req.api_version(),
            KafkaRequest::OffsetCommit(ref req) => req.api_version(),
            KafkaRequest::OffsetFetch(ref req) => req.api_version(),
        }
    }

    fn encode_payload(&self, dst: &mut BytesMut) -> Result<()> {
        match *self {
            KafkaRequest::Offset(ref req) => req.encode::<BigEndian>(dst),
            KafkaRequest::OffsetCommit(ref req) => req.encode::<BigEndian>(dst),
            KafkaRequest::OffsetFetch(ref req) => req.encode::<BigEndian>(dst),
        }
    }
}

/// `header ++ req.encode()`, per §4.2.
pub fn encode_request<'a>(
    client_id: Option<Cow<'a, str>>,
    correlation_id: CorrelationId,
    req: &KafkaRequest,
) -> Result<BytesMut> {
    let header = RequestHeader {
        api_key: req.api_key(),
        api_version: req.api_version(),
        correlation_id,
        client_id,
    };

    let mut buf = BytesMut::with_capacity(256);
    header.encode::<BigEndian>(&mut buf);
    req.encode_payload(&mut buf)?;

    Ok(buf)
}

/// The decoded body of whichever response came back; paired with the
/// `api_key` of the request that was sent so the caller can assert it
/// got the response it expected.
#[derive(Clone, Debug, PartialEq)]
pub enum KafkaResponse {
    Offset(OffsetResponse),
    OffsetCommit(OffsetCommitResponse),
    OffsetFetch(OffsetFetchResponse),
}

impl KafkaResponse {
    pub fn api_key(&self) -> ApiKey {
        match *self {
            KafkaResponse::Offset(_) => API_KEY_OFFSETS,
            KafkaResponse::OffsetCommit(_) => API_KEY_OFFSET_COMMIT,
            KafkaResponse::OffsetFetch(_) => API_KEY_OFFSET_FETCH,
        }
    }
}

/// Strip `correlation_id` and delegate the remainder to the decoder for
/// `api_key`.
pub fn decode_response(api_key: ApiKey, buf: &[u8]) -> Result<(CorrelationId, KafkaResponse)> {
    let (header, rest) = match parse_response_header(buf) {
        ::nom::IResult::Done(rest, header) => (header, rest),
        _ => bail!(ErrorKind::Malformed("truncated response header")),
    };

    let response = match api_key {
        API_KEY_OFFSETS => KafkaResponse::Offset(OffsetResponse::decode::<BigEndian>(rest)?),
        API_KEY_OFFSET_COMMIT => {
            KafkaResponse::OffsetCommit(OffsetCommitResponse::decode::<BigEndian>(rest)?)
        }
        API_KEY_OFFSET_FETCH => {
            KafkaResponse::OffsetFetch(OffsetFetchResponse::decode::<BigEndian>(rest)?)
        }
        _ => bail!(ErrorKind::UnexpectedResponse(api_key)),
    };

    Ok((header.correlation_id, response))
}

/// A boxed, `'static` future carrying our own `Error`, the same wrapper
/// the client uses everywhere it hands a future across an `Rc` boundary.
pub struct StaticBoxFuture<T = (), E = Error>(Box<Future<Item = T, Error = E> + 'static>)
where
    T: 'static,
    E: 'static;

impl<T, E> StaticBoxFuture<T, E> {
    pub fn new<F>(inner: F) -> Self
    where
        F: IntoFuture<Item = T, Error = E> + 'static,
        T: 'static,
        E: 'static,
    {
        StaticBoxFuture(Box::new(inner.into_future()))
    }

    pub fn ok(item: T) -> Self {
        StaticBoxFuture(Box::new(future::ok(item)))
    }

    pub fn err(err: E) -> Self {
        StaticBoxFuture(Box::new(future::err(err)))
    }
}

impl<T, E> From<ErrorKind> for StaticBoxFuture<T, E>
where
    E: From<ErrorKind>,
{
    fn from(err: ErrorKind) -> Self {
        Self::err(err.into())
    }
}

impl<T, E> Future for StaticBoxFuture<T, E> {
    type Item = T;
    type Error = E;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        self.0.poll()
    }
}

/// Send-and-receive to a single broker, with internal correlation-id
/// matching folded into the future it returns. `close` is idempotent.
pub trait Connection {
    fn request(&self, req: KafkaRequest) -> StaticBoxFuture<KafkaResponse>;
    fn close(&self);
}
