//! Error types
//!
//! A single crate-level [`Error`] plus the [`ProtocolError`] raised by the
//! wire codec.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or stream I/O failure
    Io(io::Error),
    /// Malformed or unexpected wire data
    Protocol(ProtocolError),
    /// The server rejected the requested identity
    IdentityUnavailable(String),
    /// Payload does not fit in a single datagram
    PayloadTooLarge { size: usize, max: usize },
    /// Peer closed the stream
    ConnectionClosed,
    /// Operation attempted on a session that has been closed
    SessionClosed,
    /// Multicast send requested but the session has no multicast membership
    MulticastDisabled,
}

impl Error {
    /// Whether a decode failure leaves the stream usable.
    ///
    /// Frame bodies that fail to parse are skipped because the length prefix
    /// already consumed them. Everything else means framing is lost or the
    /// peer is gone.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Protocol(e) => !matches!(e, ProtocolError::FrameTooLarge(_)),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::IdentityUnavailable(name) => write!(f, "Username unavailable: {}", name),
            Error::PayloadTooLarge { size, max } => {
                write!(f, "Payload too large: {} bytes (max {})", size, max)
            }
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::SessionClosed => write!(f, "Session closed"),
            Error::MulticastDisabled => write!(f, "Multicast is disabled for this session"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

/// Wire decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer ended before the message was complete
    UnexpectedEof,
    /// Unknown message type tag
    UnknownMessageType(u8),
    /// String field is not valid UTF-8
    InvalidUtf8,
    /// Declared frame length exceeds the limit
    FrameTooLarge(usize),
    /// Bytes left over after a complete message
    TrailingBytes(usize),
    /// Well-formed message arrived where another kind was required
    UnexpectedMessage(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnexpectedEof => write!(f, "unexpected end of data"),
            ProtocolError::UnknownMessageType(t) => write!(f, "unknown message type 0x{:02x}", t),
            ProtocolError::InvalidUtf8 => write!(f, "invalid UTF-8 in string field"),
            ProtocolError::FrameTooLarge(len) => write!(f, "frame of {} bytes exceeds limit", len),
            ProtocolError::TrailingBytes(n) => write!(f, "{} trailing bytes after message", n),
            ProtocolError::UnexpectedMessage(what) => write!(f, "unexpected message: {}", what),
        }
    }
}

impl std::error::Error for ProtocolError {}
