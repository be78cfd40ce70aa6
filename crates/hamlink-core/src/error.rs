//! Error types for hamlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! remote-rejection errors are all captured here.

/// The error type for all hamlink operations.
///
/// Variants follow the failure taxonomy of the adapter layer: transport
/// failures, malformed frames, timeouts, and commands the remote end
/// refused.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (socket connect, bind, or write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed frame, bad magic, truncated field).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the remote end.
    #[error("timeout waiting for response")]
    Timeout,

    /// The remote end answered a command with a non-zero status.
    #[error("command rejected (0x{code:08X}): {message}")]
    Rejected {
        /// Status code reported by the remote end.
        code: u32,
        /// Accompanying message text, possibly empty.
        message: String,
    },

    /// An HTTP request failed or returned a non-success status.
    #[error("http error: {0}")]
    Http(String),

    /// An invalid parameter was passed to an adapter operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
