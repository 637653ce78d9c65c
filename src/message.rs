//! Request / response values and per-connection configuration.

use std::time::Duration;

use bytes::Bytes;

use codec::Header;

/// A caller-supplied request.
///
/// The connection core does not interpret the headers beyond sending them;
/// pseudo-headers (`:method`, `:path`, ...) are the caller's responsibility.
#[derive(Debug, Clone)]
pub struct Request {
    /// The full header block to send, pseudo-headers first.
    pub headers: Vec<Header>,
    /// The request body; empty means the exchange is bodyless and the local
    /// side closes together with the header block.
    pub body: Bytes,
}

impl Request {
    /// A bodyless request from a header block.
    pub fn new(headers: Vec<Header>) -> Request {
        Request {
            headers: headers,
            body: Bytes::new(),
        }
    }

    /// A request carrying a body.
    pub fn with_body(headers: Vec<Header>, body: Bytes) -> Request {
        Request {
            headers: headers,
            body: body,
        }
    }
}

/// The accumulated outcome of one successful exchange.
#[derive(Debug)]
pub struct Response {
    /// Status parsed from the `:status` pseudo-header.
    pub status: u16,
    /// The response header block, pseudo-headers included.
    pub headers: Vec<Header>,
    /// The full response body.
    pub body: Bytes,
}

/// Per-connection knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tear the connection down after this long without a byte moving in
    /// either direction.
    pub idle_timeout: Duration,
    /// Reset any exchange whose response body grows past this many bytes;
    /// 0 disables the limit.
    pub max_response_size: usize,
    /// Log a warning once a response body grows past this many bytes;
    /// 0 disables the warning.
    pub warn_response_size: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            idle_timeout: Duration::from_secs(240),
            max_response_size: 0,
            warn_response_size: 0,
        }
    }
}
