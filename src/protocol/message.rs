//! `Message`/`MessageSet` framing (v0, no timestamp):
//!
//! ```text
//! Message => Offset MessageSize Crc MagicByte Attributes Key Value
//!   Offset => int64
//!   MessageSize => int32
//!   Crc => int32
//!   MagicByte => int8
//!   Attributes => int8
//!   Key => bytes
//!   Value => bytes
//!
//! MessageSet => [Message]
//! ```
//!
//! A `MessageSet` is a bare concatenation of encoded messages with no
//! outer count or length — the only way to know you're done is to run
//! out of bytes, and a partial trailing record (the broker truncated its
//! response mid-message) is not an error: decoding just stops there.

use bytes::{BufMut, ByteOrder, BytesMut};

use crc::crc32;

use codec::{decode_bytes, encode_bytes};
use errors::Result;
use protocol::Offset;

/// The only magic byte this crate writes or accepts.
pub const MAGIC_BYTE: i8 = 0;

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub offset: Offset,
    pub attributes: i8,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

impl Message {
    /// Encode a single message, backfilling `MessageSize` and `Crc` once
    /// the record's true length is known.
    pub fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i64::<T>(self.offset);

        let size_off = dst.len();
        dst.put_i32::<T>(0);
        let crc_off = dst.len();
        dst.put_i32::<T>(0);
        let data_off = dst.len();

        dst.put_i8(MAGIC_BYTE);
        dst.put_i8(self.attributes);
        encode_bytes::<T>(self.key.as_ref().map(|v| v.as_slice()), dst);
        encode_bytes::<T>(self.value.as_ref().map(|v| v.as_slice()), dst);

        let size = dst.len() - crc_off;
        let crc = crc32::checksum_ieee(&dst[data_off..]);

        T::write_i32(&mut dst[size_off..], size as i32);
        T::write_i32(&mut dst[crc_off..], crc as i32);

        Ok(())
    }

    /// Decode a single message from the front of `src`. Returns `None`
    /// (with `src` untouched) when `src` doesn't hold a complete record —
    /// the caller treats that as "end of set", not an error.
    fn decode<T: ByteOrder>(src: &[u8]) -> Result<Option<(Message, &[u8])>> {
        if src.len() < 12 {
            return Ok(None);
        }

        let offset = T::read_i64(src);
        let size = T::read_i32(&src[8..]) as usize;
        let rest = &src[12..];

        if rest.len() < size {
            return Ok(None);
        }

        let record = &rest[..size];
        let after = &rest[size..];

        if size < 6 {
            bail!(::errors::ErrorKind::Malformed("message size too small for crc/magic/attrs"));
        }

        let crc = T::read_i32(record) as u32;
        let body = &record[4..];
        let checksum = crc32::checksum_ieee(body);
        if checksum != crc {
            bail!(::errors::ErrorKind::Malformed("message crc mismatch"));
        }

        let magic = body[0] as i8;
        if magic != MAGIC_BYTE {
            bail!(::errors::ErrorKind::Malformed("unsupported message magic byte"));
        }
        let attributes = body[1] as i8;

        let (key, body) = decode_bytes::<T>(&body[2..])?;
        let (value, _) = decode_bytes::<T>(body)?;

        Ok(Some((
            Message {
                offset,
                attributes,
                key,
                value,
            },
            after,
        )))
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct MessageSet {
    pub messages: Vec<Message>,
}

impl MessageSet {
    pub fn encode<T: ByteOrder>(&self, dst: &mut BytesMut) -> Result<()> {
        for message in &self.messages {
            message.encode::<T>(dst)?;
        }
        Ok(())
    }

    /// Decode as many complete messages as `src` holds, stopping cleanly
    /// at the first incomplete or missing record rather than erroring.
    pub fn decode<T: ByteOrder>(mut src: &[u8]) -> Result<MessageSet> {
        let mut messages = Vec::new();

        while let Some((message, rest)) = Message::decode::<T>(src)? {
            messages.push(message);
            src = rest;
        }

        Ok(MessageSet { messages })
    }
}
