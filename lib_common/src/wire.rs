//! # TLV Wire Codec
//!
//! One frame per message, in both directions:
//!
//! ```text
//! byte 0     type byte; bit 7 = keep-alive flag, bits 0..6 = frame type
//! bytes 1..5 payload length, u32 big-endian
//! bytes 5..  payload
//! ```
//!
//! `EVENT` payloads are JSON-encoded [`Event`](crate::event::Event) records.
//! The decoder is incremental: bytes are fed in as they arrive off the socket
//! and complete frames come out, so partial reads are a normal condition
//! rather than an error.

use crate::errors::FeedError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// High bit of the type byte: the sender intends to keep the stream open.
pub const KEEP_ALIVE_BIT: u8 = 0x80;

/// Type byte + u32 length.
pub const HEADER_LEN: usize = 5;

/// A length field beyond this can only be garbage; the stream can no longer
/// be framed and must be torn down.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// The closed set of frame types the protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// JSON-encoded event record.
    Event,
    /// Client subscription handshake; payload carries optional credentials.
    Hello,
    /// Server-initiated end of stream; empty payload.
    Close,
    /// Server rejected the handshake credentials; terminal for the client.
    Reject,
}

impl FrameType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits & !KEEP_ALIVE_BIT {
            0 => Some(FrameType::Event),
            1 => Some(FrameType::Hello),
            2 => Some(FrameType::Close),
            3 => Some(FrameType::Reject),
            _ => None,
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            FrameType::Event => 0,
            FrameType::Hello => 1,
            FrameType::Close => 2,
            FrameType::Reject => 3,
        }
    }
}

/// One decoded frame. The raw type byte is kept so unknown types can be
/// reported (and counted) by the consumer instead of killing the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub type_bits: u8,
    pub keep_alive: bool,
    pub payload: Bytes,
}

impl Frame {
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_bits(self.type_bits)
    }
}

/// Payload of the HELLO handshake frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Encodes a single frame ready for the socket.
///
/// Enforces the same length ceiling as the decoder, so a frame that leaves
/// this function is always one the peer can accept.
pub fn encode_frame(
    frame_type: FrameType,
    keep_alive: bool,
    payload: &[u8],
) -> Result<Bytes, FeedError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FeedError::Frame {
            reason: format!(
                "payload length {} exceeds maximum {}",
                payload.len(),
                MAX_FRAME_LEN
            ),
        });
    }

    let mut type_byte = frame_type.bits() & !KEEP_ALIVE_BIT;
    if keep_alive {
        type_byte |= KEEP_ALIVE_BIT;
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(type_byte);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Incremental frame decoder over a growable byte buffer.
///
/// Mirrors the header-then-body read state machine of a non-blocking socket
/// loop: `extend` with whatever the socket produced, then drain complete
/// frames with `next_frame` until it returns `None`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes read from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the next complete frame, or `None` if more bytes are needed.
    ///
    /// An over-length header is a framing failure: the decoder cannot
    /// resynchronize, so the caller must drop the connection.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FeedError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let type_byte = self.buf[0];
        let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FeedError::Frame {
                reason: format!("frame length {} exceeds maximum {}", len, MAX_FRAME_LEN),
            });
        }

        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buf.advance(HEADER_LEN);
        let payload = self.buf.split_to(len).freeze();
        Ok(Some(Frame {
            type_bits: type_byte & !KEEP_ALIVE_BIT,
            keep_alive: type_byte & KEEP_ALIVE_BIT != 0,
            payload,
        }))
    }

    /// Bytes currently buffered but not yet consumed as frames.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    #[test]
    fn frame_round_trip() {
        let ev = Event::new("AAPL", 1000, 2.5);
        let payload = serde_json::to_vec(&ev).unwrap();
        let encoded = encode_frame(FrameType::Event, true, &payload).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded);
        let frame = decoder.next_frame().unwrap().unwrap();

        assert_eq!(frame.frame_type(), Some(FrameType::Event));
        assert!(frame.keep_alive);
        let back: Event = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(back, ev);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn partial_reads_reassemble() {
        let encoded = encode_frame(FrameType::Event, false, b"0123456789").unwrap();

        let mut decoder = FrameDecoder::new();
        // Feed one byte at a time; nothing comes out until the last byte.
        for byte in &encoded[..encoded.len() - 1] {
            decoder.extend(std::slice::from_ref(byte));
            assert!(decoder.next_frame().unwrap().is_none());
        }
        decoder.extend(&encoded[encoded.len() - 1..]);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(&frame.payload[..], b"0123456789");
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let a = encode_frame(FrameType::Event, true, b"a").unwrap();
        let b = encode_frame(FrameType::Close, false, b"").unwrap();

        let mut decoder = FrameDecoder::new();
        let mut joined = a.to_vec();
        joined.extend_from_slice(&b);
        decoder.extend(&joined);

        let first = decoder.next_frame().unwrap().unwrap();
        assert_eq!(first.frame_type(), Some(FrameType::Event));
        let second = decoder.next_frame().unwrap().unwrap();
        assert_eq!(second.frame_type(), Some(FrameType::Close));
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn oversize_length_is_a_framing_failure() {
        let mut decoder = FrameDecoder::new();
        let mut bad = vec![FrameType::Event.bits()];
        bad.extend_from_slice(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        decoder.extend(&bad);
        assert!(matches!(
            decoder.next_frame(),
            Err(FeedError::Frame { .. })
        ));
    }

    #[test]
    fn oversize_payload_is_refused_on_encode() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            encode_frame(FrameType::Event, true, &payload),
            Err(FeedError::Frame { .. })
        ));
        // At the limit exactly, the frame goes through.
        assert!(encode_frame(FrameType::Event, true, &payload[..MAX_FRAME_LEN]).is_ok());
    }

    #[test]
    fn unknown_type_bits_are_surfaced_not_fatal() {
        let mut raw = vec![0x17u8];
        raw.extend_from_slice(&2u32.to_be_bytes());
        raw.extend_from_slice(b"xx");

        let mut decoder = FrameDecoder::new();
        decoder.extend(&raw);
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.frame_type(), None);
        assert_eq!(frame.type_bits, 0x17);
    }
}
