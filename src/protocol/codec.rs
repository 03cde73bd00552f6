//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.
//! Readers take a `what` label naming the field, so a short payload
//! reports which part of the message was missing.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16, I32, U16, U32};

use crate::error::DecodeError;

type Read<'a, T> = Result<(T, &'a [u8]), DecodeError>;

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8<'a>(data: &'a [u8], what: &'static str) -> Read<'a, u8> {
    match data.split_first() {
        Some((&byte, rest)) => Ok((byte, rest)),
        None => Err(DecodeError::Truncated(what)),
    }
}

/// Read 2-byte big-endian signed integer.
#[inline]
pub fn read_i16<'a>(data: &'a [u8], what: &'static str) -> Read<'a, i16> {
    let (value, rest) = I16::read_from_prefix(data).map_err(|_| DecodeError::Truncated(what))?;
    Ok((value.get(), rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16<'a>(data: &'a [u8], what: &'static str) -> Read<'a, u16> {
    let (value, rest) = U16::read_from_prefix(data).map_err(|_| DecodeError::Truncated(what))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32<'a>(data: &'a [u8], what: &'static str) -> Read<'a, i32> {
    let (value, rest) = I32::read_from_prefix(data).map_err(|_| DecodeError::Truncated(what))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32<'a>(data: &'a [u8], what: &'static str) -> Read<'a, u32> {
    let (value, rest) = U32::read_from_prefix(data).map_err(|_| DecodeError::Truncated(what))?;
    Ok((value.get(), rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes<'a>(data: &'a [u8], len: usize, what: &'static str) -> Read<'a, &'a [u8]> {
    data.split_at_checked(len)
        .ok_or(DecodeError::Truncated(what))
}

/// Read null-terminated string bytes (PostgreSQL String type), without the terminator.
#[inline]
pub fn read_cstring<'a>(data: &'a [u8], what: &'static str) -> Read<'a, &'a [u8]> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(DecodeError::MissingNullTerminator(what)),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr<'a>(data: &'a [u8], what: &'static str) -> Read<'a, &'a str> {
    let (bytes, rest) = read_cstring(data, what)?;
    let s = simdutf8::basic::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(what))?;
    Ok((s, rest))
}

/// Write null-terminated string (PostgreSQL String type).
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Message builder helper that handles the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_untagged(buf)
    }

    /// Start building a message without a type byte (startup, SSL probe, cancel).
    pub fn new_untagged(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write an i16.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as u32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers() {
        let data = [0x00, 0x01, 0xff, 0xff, 0xff, 0xff, 0x07];
        let (a, rest) = read_u16(&data, "a").unwrap();
        let (b, rest) = read_i32(rest, "b").unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, -1);
        assert_eq!(rest, &[0x07]);
        assert_eq!(read_i32(rest, "c"), Err(DecodeError::Truncated("c")));
    }

    #[test]
    fn test_read_cstr() {
        let (s, rest) = read_cstr(b"user\0postgres\0", "name").unwrap();
        assert_eq!(s, "user");
        assert_eq!(rest, b"postgres\0");
        assert_eq!(
            read_cstr(b"open", "name"),
            Err(DecodeError::MissingNullTerminator("name"))
        );
        assert_eq!(
            read_cstr(b"\xff\0", "name"),
            Err(DecodeError::InvalidUtf8("name"))
        );
    }

    #[test]
    fn test_message_builder_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'Q');
        msg.write_cstr("abc");
        msg.finish();
        assert_eq!(buf, b"Q\x00\x00\x00\x08abc\0");
    }
}
