//! Error types for the client.

use thiserror::Error;

/// Errors raised by the client.
///
/// Most operations deliberately do not surface errors at all: send
/// operations collapse transport failures into a `false` return, and
/// await-response operations collapse transport failures, timeouts and
/// session termination into a `None` reply. [`Error::TanNotAvailable`] is
/// the only variant that crosses the public API boundary; the rest are
/// internal session-fatal conditions that drive reconnection.
#[derive(Debug, Error)]
pub enum Error {
    /// A connect, read, write or close operation on the underlying socket
    /// failed, or the server closed the connection.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// An inbound line could not be parsed as a JSON message.
    #[error("malformed server message: {0}")]
    Parse(#[from] serde_json::Error),

    /// The server rejected a step of the session setup sequence, or a
    /// reply arrived without the fields the sequence requires.
    #[error("session setup failed: {0}")]
    Protocol(String),

    /// No matching reply arrived within the deadline.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// The caller supplied a transaction number that is already attached
    /// to an in-flight request.
    #[error("tan {0} is already in use")]
    TanNotAvailable(u32),
}
