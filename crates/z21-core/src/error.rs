//! Error types for the z21 workspace.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! session-layer errors are all captured here.

/// The error type for all z21 operations.
///
/// Variants cover the full range of failure modes encountered when talking
/// to a command station over UDP: socket failures, malformed frames,
/// checksum mismatches, handshake timeouts, and caller mistakes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (UDP bind, send, receive).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed frame, unknown header, truncated payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An X-Bus frame arrived with a bad XOR checksum.
    #[error("checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    Checksum {
        /// Checksum computed over the received frame body.
        expected: u8,
        /// Checksum byte carried by the frame.
        actual: u8,
    },

    /// Timed out waiting for a response from the command station.
    ///
    /// During the connect handshake this typically means the station is
    /// powered off or the address points at something that is not a Z21.
    #[error("timeout waiting for response")]
    Timeout,

    /// The command station did not answer an ICMP echo.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// An invalid parameter was passed to a command (slot out of 1..=120,
    /// feedback group out of 0..=1, unparseable host).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No session with a command station has been established.
    #[error("not connected")]
    NotConnected,

    /// The session with the command station was lost.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
