//! Error types for the protocol layer.

/// Errors that can occur while framing or unframing messages.
///
/// Note what is *not* an error: an incomplete frame. [`Frame::try_read`]
/// returns `Ok(None)` for a partial frame because "not enough bytes yet" is
/// the expected steady state of a stream socket, not a failure. Everything
/// in this enum is a real problem.
///
/// [`Frame::try_read`]: crate::Frame::try_read
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame header's signature bytes don't match the protocol
    /// signature. This means the peer is either not speaking this protocol
    /// at all or the stream has desynchronized; in both cases the stream
    /// cannot be safely re-synchronized and the connection must be closed.
    #[error("invalid frame signature: byte {byte:#04x} at offset {offset}")]
    InvalidSignature {
        /// Offset within the 5-byte signature where the mismatch occurred.
        offset: usize,
        /// The byte actually found there.
        byte: u8,
    },

    /// A payload longer than the 16-bit length field can describe.
    /// Only reachable when *constructing* a message locally — decoded
    /// payloads are bounded by the field itself.
    #[error("payload of {0} bytes exceeds the 65535-byte frame limit")]
    PayloadTooLarge(usize),

    /// A structured payload (match parameters, surrender timestamp) failed
    /// to serialize or deserialize.
    #[error("invalid structured payload: {0}")]
    Payload(#[from] serde_json::Error),
}
