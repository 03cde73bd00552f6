//! Reassembly of backend frames from arbitrary byte chunks.
//!
//! Every backend message is a 1-byte tag, a 4-byte big-endian length that
//! counts itself and the payload (not the tag), and the payload. Bytes are
//! pushed in as they arrive from the transport; `read` hands back complete
//! frames in arrival order and keeps any incomplete tail for the next chunk.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::DecodeError;

/// Size of the tag byte.
pub const HEADER_SIZE: usize = 1;

/// Size of the length field.
pub const LENGTH_SIZE: usize = 4;

/// Largest frame accepted by default (PostgreSQL's own allocation limit).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 30;

/// One complete backend frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message tag
    pub tag: u8,
    /// Declared length (includes the length field, excludes the tag)
    pub length: u32,
    /// Payload, `length - 4` bytes
    pub payload: Bytes,
}

/// Buffers incoming chunks and yields complete frames.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameReader {
    /// Create a reader with the default frame size limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a reader that rejects frames declaring more than `max_frame_len` bytes.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            max_frame_len,
        }
    }

    /// Append raw input.
    pub fn add_chunk(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet consumed as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete frame.
    ///
    /// Returns `Ok(None)` when the buffered bytes do not hold a whole frame yet.
    /// Call repeatedly until `None` to drain everything that has arrived.
    pub fn read(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.buf.len() < HEADER_SIZE + LENGTH_SIZE {
            return Ok(None);
        }

        let tag = self.buf[0];
        let declared = i32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
        if declared < LENGTH_SIZE as i32 {
            return Err(DecodeError::InvalidFrameLength(declared));
        }

        let length = declared as usize;
        if length > self.max_frame_len {
            return Err(DecodeError::FrameTooLarge {
                length,
                limit: self.max_frame_len,
            });
        }

        // Bytes available from the start of the length field. The buffer grows
        // only as payload bytes arrive, never up front from the declared length.
        if self.buf.len() - HEADER_SIZE < length {
            return Ok(None);
        }

        self.buf.advance(HEADER_SIZE + LENGTH_SIZE);
        let payload = self.buf.split_to(length - LENGTH_SIZE).freeze();

        Ok(Some(Frame {
            tag,
            length: length as u32,
            payload,
        }))
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(tag: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&((payload.len() + 4) as i32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn drain(reader: &mut FrameReader) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = reader.read().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_chunk() {
        let mut reader = FrameReader::new();
        reader.add_chunk(&frame_bytes(b'C', b"SELECT 1\0"));

        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.tag, b'C');
        assert_eq!(frame.length, 13);
        assert_eq!(&frame.payload[..], b"SELECT 1\0");
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_split_at_every_boundary() {
        let mut stream = frame_bytes(b'S', b"client_encoding\0UTF8\0");
        stream.extend(frame_bytes(b'K', &[0, 0, 0, 123, 0, 0, 1, 200]));
        stream.extend(frame_bytes(b'Z', b"I"));

        let mut whole = FrameReader::new();
        whole.add_chunk(&stream);
        let expected = drain(&mut whole);
        assert_eq!(expected.len(), 3);

        for split in 0..=stream.len() {
            let mut reader = FrameReader::new();
            reader.add_chunk(&stream[..split]);
            let mut frames = drain(&mut reader);
            reader.add_chunk(&stream[split..]);
            frames.extend(drain(&mut reader));
            assert_eq!(frames, expected, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let stream = [frame_bytes(b'Z', b"I"), frame_bytes(b'Z', b"T")].concat();
        let mut reader = FrameReader::new();
        let mut frames = Vec::new();
        for byte in &stream {
            reader.add_chunk(std::slice::from_ref(byte));
            frames.extend(drain(&mut reader));
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[1].payload[..], b"T");
    }

    #[test]
    fn test_partial_payload_is_held_back() {
        let bytes = frame_bytes(b'D', &[0, 1, 0, 0, 0, 3, b'a', b'b', b'c']);
        let mut reader = FrameReader::new();
        reader.add_chunk(&bytes[..bytes.len() - 1]);
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.buffered(), bytes.len() - 1);

        // Tail of this frame plus the start of the next one.
        reader.add_chunk(&[bytes[bytes.len() - 1], b'Z', 0, 0]);
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.payload.len(), 9);
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.buffered(), 3);

        reader.add_chunk(&[0, 5, b'I']);
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.tag, b'Z');
        assert_eq!(&frame.payload[..], b"I");
    }

    #[test]
    fn test_empty_payload() {
        let mut reader = FrameReader::new();
        reader.add_chunk(&frame_bytes(b'I', b""));
        let frame = reader.read().unwrap().unwrap();
        assert_eq!(frame.length, 4);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_invalid_length() {
        let mut reader = FrameReader::new();
        reader.add_chunk(&[b'Z', 0, 0, 0, 3]);
        assert_eq!(reader.read(), Err(DecodeError::InvalidFrameLength(3)));
    }

    #[test]
    fn test_frame_too_large() {
        let mut reader = FrameReader::with_max_frame_len(64);
        reader.add_chunk(&[b'D', 0, 0, 1, 0]);
        assert_eq!(
            reader.read(),
            Err(DecodeError::FrameTooLarge {
                length: 256,
                limit: 64
            })
        );
    }

    #[test]
    fn test_large_header_does_not_allocate_payload() {
        let mut reader = FrameReader::new();
        reader.add_chunk(&[b'D', 0x3f, 0xff, 0xff, 0xff]);
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.buffered(), 5);
        assert!(reader.buf.capacity() < 1 << 20);

        reader.add_chunk(&[0u8; 4096]);
        assert!(reader.read().unwrap().is_none());
        assert!(reader.buf.capacity() < 1 << 20);
    }
}
