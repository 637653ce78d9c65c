//! Error types for connection teardown and per-exchange failure.
//!
//! The two enums mirror the two blast radii in the dispatcher: a
//! `ConnectionError` is a cause that takes the whole connection down and is
//! accumulated in order on the session, while a `StreamError` is what a
//! single exchange's completion resolves with. A connection-fatal cause
//! reaches every open exchange as `StreamError::ConnectionLost` carrying the
//! shared cause list.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::sync::oneshot::Canceled;

use codec::StreamId;

/// A cause that contributed to tearing down the whole connection.
///
/// More than one cause may accumulate before the transport is actually gone,
/// e.g. a protocol violation quickly followed by the transport reporting
/// closure.
#[derive(Debug)]
pub enum ConnectionError {
    /// The TLS layer negotiated something other than the expected protocol.
    InvalidNegotiatedProtocol(String),
    /// The codec rejected inbound bytes as a protocol violation.
    Protocol(String),
    /// The peer terminated the connection with a GOAWAY-style frame.
    RemoteTerminated {
        /// Error code carried by the termination frame.
        error_code: u32,
        /// Highest stream id the peer claims to have processed.
        last_stream_id: StreamId,
    },
    /// No bytes moved in either direction for the configured window.
    IdleTimeout(Duration),
    /// The transport failed or closed abnormally.
    Io(io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConnectionError::InvalidNegotiatedProtocol(ref proto) => {
                write!(f, "expected h2 as negotiated protocol, received {:?}", proto)
            }
            ConnectionError::Protocol(ref msg) => {
                write!(f, "protocol violation: {}", msg)
            }
            ConnectionError::RemoteTerminated { error_code, last_stream_id } => {
                write!(f, "remote terminated connection; error_code={}; last_stream_id={}",
                       error_code, last_stream_id)
            }
            ConnectionError::IdleTimeout(dur) => {
                write!(f, "connection was idle for more than {:?}", dur)
            }
            ConnectionError::Io(ref e) => write!(f, "transport error: {}", e),
        }
    }
}

impl StdError for ConnectionError {
    fn cause(&self) -> Option<&StdError> {
        match *self {
            ConnectionError::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> ConnectionError {
        ConnectionError::Io(e)
    }
}

/// Why a single exchange failed.
///
/// Callers branch on this to pick a retry policy: `Reset` rejected just this
/// exchange, `ConnectionLost` / `Inactive` mean the whole connection died and
/// a new one is needed before retrying.
#[derive(Debug, Clone)]
pub enum StreamError {
    /// The peer (or the local size guard) aborted this one exchange.
    Reset,
    /// The connection was torn down after this exchange had sent its request.
    ///
    /// Carries the accumulated teardown causes, shared by every exchange that
    /// was open at the time.
    ConnectionLost(Arc<Vec<ConnectionError>>),
    /// The connection was torn down before this exchange ever started.
    Inactive,
    /// The response body exceeded the configured size limit.
    ResponseTooLarge {
        /// Bytes received before the limit tripped.
        received: usize,
        /// The configured limit.
        limit: usize,
    },
    /// The connection task was dropped before this exchange resolved.
    ConnectionGone,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StreamError::Reset => write!(f, "exchange reset"),
            StreamError::ConnectionLost(ref causes) => {
                write!(f, "connection lost ({} cause(s))", causes.len())
            }
            StreamError::Inactive => {
                write!(f, "connection closed before the exchange started")
            }
            StreamError::ResponseTooLarge { received, limit } => {
                write!(f, "response exceeded size limit; received={}; limit={}",
                       received, limit)
            }
            StreamError::ConnectionGone => write!(f, "connection task is gone"),
        }
    }
}

impl StdError for StreamError {}

impl From<Canceled> for StreamError {
    fn from(_: Canceled) -> StreamError {
        StreamError::ConnectionGone
    }
}
