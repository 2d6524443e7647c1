//! Frame codec: the length-prefixed binary layout of one message.
//!
//! Every frame on the wire has the same shape:
//!
//! ```text
//! ┌───────────────────┬──────────────┬──────────┬───────────────┐
//! │ signature (5 B)   │ length (2 B) │ tag (1 B)│ payload (N B) │
//! │ 01 02 03 04 05    │ u16, LE      │ u8       │               │
//! └───────────────────┴──────────────┴──────────┴───────────────┘
//! ```
//!
//! Encoding is a plain buffer append. Decoding is the interesting half:
//! a TCP read can deliver half a frame, three frames, or a frame and a
//! half, so [`Frame::try_read`] is written to be called repeatedly against
//! a growing byte window. It never consumes input — the caller advances
//! its own cursor by [`Frame::total_len`] after each decoded frame — and
//! it distinguishes "not enough bytes yet" (`Ok(None)`, keep reading) from
//! "this is not our protocol" (`Err`, close the connection).

use crate::{Message, MessageType, ProtocolError};

/// The 5 signature bytes that open every frame.
pub const SIGNATURE: [u8; 5] = [1, 2, 3, 4, 5];

/// Fixed header size: signature + length field + type tag.
pub const HEADER_LEN: usize = SIGNATURE.len() + 2 + 1;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

impl Message {
    /// Total encoded size of this message: header plus payload.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.payload().len()
    }

    /// Encodes the full frame into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Appends the full frame to `buf`.
    ///
    /// The payload length is guaranteed to fit `u16` by the [`Message`]
    /// construction invariant.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&SIGNATURE);
        buf.extend_from_slice(&(self.payload().len() as u16).to_le_bytes());
        buf.push(self.message_type().tag());
        buf.extend_from_slice(self.payload());
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A decoded view of one frame, borrowing its payload from the input
/// window. Zero-copy: nothing is allocated until the caller decides it
/// needs an owned [`Message`] (via [`Frame::to_message`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// The decoded type tag.
    pub kind: MessageType,
    /// The payload bytes, borrowed from the input window.
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Attempts to decode one frame from the front of `data`.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` — a complete frame starts at `data[0]`. The
    ///   caller should consume exactly [`Frame::total_len`] bytes.
    /// - `Ok(None)` — `data` holds only a prefix of a frame. Not an error;
    ///   wait for more bytes and call again with the longer window.
    /// - `Err(ProtocolError::InvalidSignature)` — the window does not start
    ///   with the protocol signature. The stream is unrecoverable.
    ///
    /// `data` is never mutated and may hold any number of frames; only the
    /// first is examined.
    ///
    /// # Errors
    /// See above — the only error is a signature mismatch.
    pub fn try_read(data: &'a [u8]) -> Result<Option<Self>, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Ok(None);
        }

        for (offset, &expected) in SIGNATURE.iter().enumerate() {
            if data[offset] != expected {
                return Err(ProtocolError::InvalidSignature {
                    offset,
                    byte: data[offset],
                });
            }
        }

        let payload_len =
            u16::from_le_bytes([data[SIGNATURE.len()], data[SIGNATURE.len() + 1]]) as usize;
        if data.len() < HEADER_LEN + payload_len {
            return Ok(None);
        }

        let kind = MessageType::from_tag(data[HEADER_LEN - 1]);
        Ok(Some(Self {
            kind,
            payload: &data[HEADER_LEN..HEADER_LEN + payload_len],
        }))
    }

    /// Total frame size: header plus payload. The caller advances its read
    /// cursor by exactly this amount after handling the frame.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Copies this view into an owned [`Message`].
    pub fn to_message(&self) -> Message {
        // The payload came out of a frame, so it necessarily fits the
        // length field; the fallible constructor cannot fail here.
        Message::with_payload(self.kind, self.payload.to_vec())
            .expect("decoded payload fits the length field")
    }
}

// =========================================================================
// Tests
// =========================================================================
