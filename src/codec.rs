//! Primitive wire types shared by every request/response: length-prefixed
//! `STRING`/`BYTES`, `ARRAY<T>`, and the `-1` NULL sentinel that both use.
//!
//! `ARRAY` never uses the NULL sentinel (an empty array is `INT32 = 0`);
//! `STRING`/`BYTES` collapse an empty value to NULL on encode, but decode
//! distinguishes `-1` (NULL) from `0` (empty) to interoperate with brokers
//! that legitimately send a zero-length, non-null value.

use std::str;

use bytes::{BufMut, ByteOrder, BytesMut};

use errors::{ErrorKind, Result};

/// Tags a nom parse failure with the record it occurred in, the same way
/// the teacher's `protocol` module tags CRC/array failures so a decode
/// error points at `Message` or `OffsetCommitResponse` rather than a bare
/// nom `ErrorKind`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ParseTag {
    RequestHeader,
    ResponseHeader,
    Message,
    MessageCrc,
    OffsetResponse,
    OffsetCommitResponse,
    OffsetFetchResponse,
}

macro_rules! parse_tag (
    ($i:expr, $tag:expr, $submac:ident!( $($args:tt)* )) => (
        add_return_error!($i, ::nom::ErrorKind::Custom($tag as u32), $submac!($($args)*))
    );
    ($i:expr, $tag:expr, $f:expr) => (
        parse_tag!($i, $tag, call!($f))
    );
);

/// Encode a `STRING`: `None` and `Some("")` both collapse to the `-1` NULL
/// sentinel; any other value is written as its UTF-8 length followed by the
/// bytes themselves.
pub fn encode_string<T: ByteOrder>(s: Option<&str>, dst: &mut BytesMut) {
    match s {
        Some(s) if !s.is_empty() => {
            dst.reserve(2 + s.len());
            dst.put_i16::<T>(s.len() as i16);
            dst.put_slice(s.as_bytes());
        }
        _ => dst.put_i16::<T>(-1),
    }
}

/// Decode a `STRING`. `-1` maps to `None`; any `N >= 0` maps to `Some` of
/// the following `N` bytes, including the empty string when `N == 0`.
pub fn decode_string<T: ByteOrder>(src: &[u8]) -> Result<(Option<String>, &[u8])> {
    if src.len() < 2 {
        bail!(ErrorKind::Malformed("truncated STRING length"));
    }

    let len = T::read_i16(src) as i32;
    let rest = &src[2..];

    if len < 0 {
        return Ok((None, rest));
    }

    let len = len as usize;
    if rest.len() < len {
        bail!(ErrorKind::Malformed("STRING length exceeds buffer"));
    }

    let s = str::from_utf8(&rest[..len])
        .map_err(|_| ErrorKind::Malformed("STRING is not valid utf8"))?
        .to_owned();

    Ok((Some(s), &rest[len..]))
}

/// Like `decode_string`, but a NULL value is a protocol error. Use for
/// fields the protocol never allows to be absent (e.g. a topic name).
pub fn decode_required_string<T: ByteOrder>(src: &[u8]) -> Result<(String, &[u8])> {
    let (s, rest) = decode_string::<T>(src)?;
    match s {
        Some(s) => Ok((s, rest)),
        None => bail!(ErrorKind::Malformed("required STRING was NULL")),
    }
}

/// Encode `BYTES`: same NULL-collapsing policy as `encode_string`, with an
/// `INT32` length prefix.
pub fn encode_bytes<T: ByteOrder>(b: Option<&[u8]>, dst: &mut BytesMut) {
    match b {
        Some(b) if !b.is_empty() => {
            dst.reserve(4 + b.len());
            dst.put_i32::<T>(b.len() as i32);
            dst.put_slice(b);
        }
        _ => dst.put_i32::<T>(-1),
    }
}

/// Decode `BYTES`. `-1` maps to `None`; any `N >= 0` maps to `Some` of the
/// following `N` raw bytes.
pub fn decode_bytes<T: ByteOrder>(src: &[u8]) -> Result<(Option<Vec<u8>>, &[u8])> {
    if src.len() < 4 {
        bail!(ErrorKind::Malformed("truncated BYTES length"));
    }

    let len = T::read_i32(src);
    let rest = &src[4..];

    if len < 0 {
        return Ok((None, rest));
    }

    let len = len as usize;
    if rest.len() < len {
        bail!(ErrorKind::Malformed("BYTES length exceeds buffer"));
    }

    Ok((Some(rest[..len].to_vec()), &rest[len..]))
}

/// Encode an `ARRAY<T>`: an `INT32` count (never the NULL sentinel — an
/// empty array is `0`, distinct from NULL) followed by each item in turn.
pub fn encode_array<T: ByteOrder, I, F>(items: &[I], dst: &mut BytesMut, mut f: F) -> Result<()>
where
    F: FnMut(&I, &mut BytesMut) -> Result<()>,
{
    dst.put_i32::<T>(items.len() as i32);
    for item in items {
        f(item, dst)?;
    }
    Ok(())
}

/// Decode an `ARRAY<T>` given a decoder for a single element.
pub fn decode_array<'a, T: ByteOrder, I, F>(src: &'a [u8], mut f: F) -> Result<(Vec<I>, &'a [u8])>
where
    F: FnMut(&'a [u8]) -> Result<(I, &'a [u8])>,
{
    if src.len() < 4 {
        bail!(ErrorKind::Malformed("truncated ARRAY count"));
    }

    let count = T::read_i32(src);
    let mut rest = &src[4..];

    if count <= 0 {
        return Ok((Vec::new(), rest));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (item, next) = f(rest)?;
        items.push(item);
        rest = next;
    }

    Ok((items, rest))
}

/// Ergonomic `BytesMut` encoding helpers, mirroring the teacher's
/// `buf.put_str::<T, _>(...)` / `buf.put_array::<T, _, _>(...)` call sites.
pub trait WriteExt {
    fn put_str<T: ByteOrder>(&mut self, s: Option<&str>);
    fn put_opt_bytes<T: ByteOrder>(&mut self, b: Option<&[u8]>);
    fn put_array<T: ByteOrder, I, F>(&mut self, items: &[I], f: F) -> Result<()>
    where
        F: FnMut(&mut BytesMut, &I) -> Result<()>;
}

impl WriteExt for BytesMut {
    fn put_str<T: ByteOrder>(&mut self, s: Option<&str>) {
        encode_string::<T>(s, self)
    }

    fn put_opt_bytes<T: ByteOrder>(&mut self, b: Option<&[u8]>) {
        encode_bytes::<T>(b, self)
    }

    fn put_array<T: ByteOrder, I, F>(&mut self, items: &[I], mut f: F) -> Result<()>
    where
        F: FnMut(&mut BytesMut, &I) -> Result<()>,
    {
        self.put_i32::<T>(items.len() as i32);
        for item in items {
            f(self, item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BigEndian;

    use super::*;

    #[test]
    fn test_encode_bytes() {
        let mut buf = BytesMut::with_capacity(16);
        encode_bytes::<BigEndian>(Some(b"hey"), &mut buf);
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x03, b'h', b'e', b'y']);

        let mut buf = BytesMut::with_capacity(16);
        encode_bytes::<BigEndian>(None, &mut buf);
        assert_eq!(&buf[..], &[0xFF, 0xFF, 0xFF, 0xFF]);

        let mut buf = BytesMut::with_capacity(16);
        encode_bytes::<BigEndian>(Some(b""), &mut buf);
        assert_eq!(&buf[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_string() {
        let mut buf = BytesMut::with_capacity(16);
        encode_string::<BigEndian>(Some("hey"), &mut buf);
        assert_eq!(&buf[..], &[0x00, 0x03, b'h', b'e', b'y']);

        let mut buf = BytesMut::with_capacity(16);
        encode_string::<BigEndian>(None, &mut buf);
        assert_eq!(&buf[..], &[0xFF, 0xFF]);

        let mut buf = BytesMut::with_capacity(16);
        encode_string::<BigEndian>(Some(""), &mut buf);
        assert_eq!(&buf[..], &[0xFF, 0xFF]);
    }

    #[test]
    fn test_bytes_round_trip() {
        for case in &[Some(&b"hey"[..]), None, Some(&b""[..])] {
            let mut buf = BytesMut::with_capacity(16);
            encode_bytes::<BigEndian>(*case, &mut buf);

            let (decoded, rest) = decode_bytes::<BigEndian>(&buf[..]).unwrap();
            assert!(rest.is_empty());

            let normalized = case.filter(|b| !b.is_empty()).map(|b| b.to_vec());
            assert_eq!(decoded, normalized);
        }
    }

    #[test]
    fn test_string_round_trip() {
        for case in &[Some("hey"), None, Some("")] {
            let mut buf = BytesMut::with_capacity(16);
            encode_string::<BigEndian>(*case, &mut buf);

            let (decoded, rest) = decode_string::<BigEndian>(&buf[..]).unwrap();
            assert!(rest.is_empty());

            let normalized = case.filter(|s| !s.is_empty()).map(|s| s.to_owned());
            assert_eq!(decoded, normalized);
        }
    }

    #[test]
    fn test_decode_zero_length_non_null_is_legal() {
        // N == 0, not -1: a legal, if unusual, wire value.
        assert_eq!(
            decode_bytes::<BigEndian>(&[0, 0, 0, 0]).unwrap(),
            (Some(Vec::new()), &[][..])
        );
        assert_eq!(
            decode_string::<BigEndian>(&[0, 0]).unwrap(),
            (Some(String::new()), &[][..])
        );
    }

    #[test]
    fn test_array_round_trip() {
        let xs = vec![1i32, 2, 3, 4];
        let mut buf = BytesMut::with_capacity(32);
        encode_array::<BigEndian, _, _>(&xs, &mut buf, |item, dst| {
            dst.put_i32::<BigEndian>(*item);
            Ok(())
        })
        .unwrap();

        let (decoded, rest) = decode_array::<BigEndian, i32, _>(&buf[..], |src| {
            Ok((BigEndian::read_i32(src), &src[4..]))
        })
        .unwrap();

        assert!(rest.is_empty());
        assert_eq!(decoded, xs);
    }

    #[test]
    fn test_empty_array_is_not_null() {
        let xs: Vec<i32> = Vec::new();
        let mut buf = BytesMut::with_capacity(8);
        encode_array::<BigEndian, _, _>(&xs, &mut buf, |_, _| Ok(())).unwrap();
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x00]);
    }
}
