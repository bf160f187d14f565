//! Error taxonomy for socket operations.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`SocketError`] separates the conditions a caller can act on (timeouts,
//! refused connections, truncated frames, a closed socket) from raw OS
//! failures, which are carried verbatim in [`SocketError::System`].

use crate::net::socket::SocketState;

use std::fmt;
use std::io;
use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SocketError>;

/// Which part of a length-prefixed frame was being read when the peer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePart {
    Header,
    Payload,
}

impl fmt::Display for FramePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Payload => write!(f, "payload"),
        }
    }
}

/// Errors produced by sockets, readiness waits and the message framer.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Host/port could not be resolved to an address of the requested family.
    #[error("unable to resolve {host}:{port}: {detail}")]
    Resolution {
        host: String,
        port: u16,
        detail: String,
    },

    /// `bind(2)` or `listen(2)` failed.
    #[error("unable to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The peer refused, was unreachable, or reset the connection attempt.
    #[error("connection to {address} failed: {source}")]
    Connection {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The operation did not complete within the configured bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Option<Duration>),

    /// The peer closed the stream in the middle of a frame.
    #[error("short read on frame {part}: received {received} of {expected} bytes")]
    ShortRead {
        part: FramePart,
        expected: usize,
        received: usize,
    },

    /// The socket has been closed; no syscall was attempted.
    #[error("socket is closed")]
    Closed,

    /// The payload cannot be described by the 16-bit length header.
    #[error("message payload of {0} bytes exceeds the 65535 byte frame limit")]
    MessageTooLarge(usize),

    /// The operation is not valid in the socket's current state.
    #[error("invalid socket state: expected {expected}, found {actual}")]
    InvalidState {
        expected: SocketState,
        actual: SocketState,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying OS error, kept verbatim for diagnostics.
    #[error(transparent)]
    System(#[from] io::Error),
}

impl SocketError {
    pub(crate) fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }

    /// Returns true when the socket was closed underneath the operation.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true when the peer closed exactly on a frame boundary.
    ///
    /// This is the framed equivalent of a zero-byte read: no bytes of the next
    /// header had been received when the stream ended.
    pub fn is_clean_eof(&self) -> bool {
        matches!(
            self,
            Self::ShortRead {
                part: FramePart::Header,
                received: 0,
                ..
            }
        )
    }

    /// Raw OS error code, when this error wraps one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::System(source) | Self::Bind { source, .. } | Self::Connection { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}
