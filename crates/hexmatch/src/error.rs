//! Top-level server errors.

/// Errors that keep the server from running at all.
///
/// Per-connection failures never surface here — they close the affected
/// connection and the process keeps serving everyone else.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// The underlying socket error.
        source: std::io::Error,
    },

    /// Another I/O failure on the listen socket.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
