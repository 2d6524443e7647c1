//! Error types for the session layer.

use hexmatch_protocol::ProtocolError;

/// Errors that end a player's connection.
///
/// These never escape to the caller as `Result`s from the public API —
/// the session reacts to all of them the same way (close the connection) —
/// but they give close reasons a uniform shape in logs.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer sent bytes that are not this protocol. Unrecoverable:
    /// there is no way to find the next frame boundary in a
    /// desynchronized stream.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The underlying socket failed (or the peer vanished mid-read).
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
