//! Length-prefixed framing of wire payloads.
//!
//! Each payload is preceded by its length:
//! ```text
//! [length: 4 bytes LE][payload: N bytes JSON]
//! ```
//! The receiver side accumulates whatever the socket hands it and splits
//! complete frames off the front, so partial reads across read timeouts are
//! harmless.

use std::io::Write;

use crate::error::TransportError;

/// Size of the length prefix.
pub const HEADER_BYTES: usize = 4;

/// Default upper bound for a single payload (64 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Prefix a payload with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut out = Vec::with_capacity(HEADER_BYTES + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Write one framed payload.
pub fn write_frame(writer: &mut impl Write, payload: &[u8]) -> Result<(), TransportError> {
    writer.write_all(&encode_frame(payload)?)?;
    Ok(())
}

/// Incremental frame splitter for a byte stream.
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl FrameReader {
    /// Creates a reader that rejects frames above `max_frame_bytes`.
    #[must_use]
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes: max_frame_bytes.max(1),
        }
    }

    /// Append bytes received from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as frames.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Split the next complete frame off the buffer.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    /// `TransportError::FrameTooLarge` if the announced length exceeds the
    /// limit. The stream cannot be resynchronized after this.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buf.len() < HEADER_BYTES {
            return Ok(None);
        }

        let mut len_bytes = [0u8; HEADER_BYTES];
        len_bytes.copy_from_slice(&self.buf[..HEADER_BYTES]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_bytes,
            });
        }

        if self.buf.len() < HEADER_BYTES + len {
            return Ok(None);
        }

        let frame = self.buf[HEADER_BYTES..HEADER_BYTES + len].to_vec();
        self.buf.drain(..HEADER_BYTES + len);
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frames_across_partial_pushes() {
        let mut bytes = encode_frame(b"{\"id\":\"a\"}").unwrap();
        bytes.extend(encode_frame(b"{\"id\":\"b\"}").unwrap());

        let mut reader = FrameReader::new(1024);
        let (head, tail) = bytes.split_at(7);

        reader.push(head);
        assert!(reader.next_frame().unwrap().is_none());

        reader.push(tail);
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"{\"id\":\"a\"}");
        assert_eq!(reader.next_frame().unwrap().unwrap(), b"{\"id\":\"b\"}");
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn empty_payload_is_a_frame() {
        let mut reader = FrameReader::new(16);
        reader.push(&encode_frame(b"").unwrap());
        assert_eq!(reader.next_frame().unwrap().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn oversized_frame_is_rejected_before_payload_arrives() {
        let mut reader = FrameReader::new(8);
        reader.push(&100u32.to_le_bytes());
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { size: 100, max: 8 }));
    }

    #[test]
    fn write_frame_matches_encode() {
        let mut out = Vec::new();
        write_frame(&mut out, b"xyz").unwrap();
        assert_eq!(out, encode_frame(b"xyz").unwrap());
        assert_eq!(&out[..4], &3u32.to_le_bytes());
    }
}
