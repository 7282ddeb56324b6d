//! The request/response envelope: `api_key | api_version | correlation_id |
//! STRING(client_id)` in front of every request payload, and a bare
//! `correlation_id` in front of every response.

use std::borrow::Cow;

use bytes::{BufMut, ByteOrder, BytesMut};
use nom::be_i32;

use codec::{ParseTag, WriteExt};
use protocol::{ApiKey, ApiVersion, CorrelationId};

#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader<'a> {
    pub api_key: ApiKey,
    pub api_version: ApiVersion,
    pub correlation_id: CorrelationId,
    pub client_id: Option<Cow<'a, str>>,
}

impl<'a> RequestHeader<'a> {
    pub fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) {
        dst.put_i16::<T>(self.api_key);
        dst.put_i16::<T>(self.api_version);
        dst.put_i32::<T>(self.correlation_id);
        dst.put_str::<T>(self.client_id.as_ref().map(|s| s.as_ref()));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: CorrelationId,
}

named!(pub parse_response_header<ResponseHeader>,
    parse_tag!(ParseTag::ResponseHeader,
        map!(be_i32, |correlation_id| ResponseHeader { correlation_id })
    )
);

#[cfg(test)]
mod tests {
    use bytes::BigEndian;
    use nom::IResult;

    use super::*;

    #[test]
    fn test_encode_request_header() {
        let header = RequestHeader {
            api_key: 2,
            api_version: 0,
            correlation_id: 123,
            client_id: Some(Cow::from("client")),
        };

        let mut buf = BytesMut::with_capacity(32);
        header.encode::<BigEndian>(&mut buf);

        assert_eq!(
            &buf[..],
            &[0, 2, 0, 0, 0, 0, 0, 123, 0, 6, b'c', b'l', b'i', b'e', b'n', b't'][..]
        );
    }

    #[test]
    fn test_encode_request_header_without_client_id() {
        let header = RequestHeader {
            api_key: 2,
            api_version: 0,
            correlation_id: 123,
            client_id: None,
        };

        let mut buf = BytesMut::with_capacity(32);
        header.encode::<BigEndian>(&mut buf);

        assert_eq!(&buf[..], &[0, 2, 0, 0, 0, 0, 0, 123, 255, 255][..]);
    }

    #[test]
    fn test_parse_response_header() {
        assert_eq!(
            parse_response_header(&[0, 0, 0, 123]),
            IResult::Done(&[][..], ResponseHeader { correlation_id: 123 })
        );
    }
}
