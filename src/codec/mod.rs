//! The boundary with the wire-level protocol engine.
//!
//! The session never touches raw frames. It owns a single `Codec` instance
//! per connection and drives it through a narrow contract: inbound bytes are
//! fed in and come back out as an ordered sequence of discrete [`Event`]s,
//! outbound intents (open an exchange, push body bytes, reset, terminate) are
//! queued through mutators, and everything the codec wants on the wire is
//! collected with [`drain_output`], which must run after every state-mutating
//! call.
//!
//! Frame parsing, header compression and flow-control window arithmetic all
//! live behind this trait. The session only ever asks "how much may I send
//! on this stream right now" and "here is how much I consumed".
//!
//! [`Event`]: enum.Event.html
//! [`drain_output`]: trait.Codec.html#tymethod.drain_output

use bytes::Bytes;

use error::ConnectionError;

/// Identifies one logical exchange on the connection.
///
/// Client-initiated exchanges use the odd sequence 1, 3, 5, ... and an id is
/// never reused within one connection's lifetime.
pub type StreamId = u32;

/// A single protocol header: name and value, pseudo-headers included.
pub type Header = (String, String);

/// Error codes the session selects from when resetting a stream or
/// terminating the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Cooperative shutdown; nothing was in flight.
    NoError,
    /// Abnormal shutdown while exchanges were still live.
    ProtocolError,
    /// The stream is refused before processing it, e.g. an oversized
    /// response cut off locally.
    RefusedStream,
    /// The stream is no longer needed.
    Cancel,
}

impl ErrorCode {
    /// The wire value of this code.
    pub fn as_u32(&self) -> u32 {
        match *self {
            ErrorCode::NoError => 0x0,
            ErrorCode::ProtocolError => 0x1,
            ErrorCode::RefusedStream => 0x7,
            ErrorCode::Cancel => 0x8,
        }
    }
}

/// Discrete protocol events produced by feeding inbound bytes to the codec.
///
/// One `feed` call may produce any number of events; their order is
/// load-bearing and the session dispatches them exactly as produced.
#[derive(Debug)]
pub enum Event {
    /// Response headers arrived for a stream. Always precedes that stream's
    /// data and end events.
    HeadersReceived {
        /// The exchange the headers belong to.
        stream_id: StreamId,
        /// The decoded header block.
        headers: Vec<Header>,
    },
    /// A chunk of response body arrived for a stream.
    DataReceived {
        /// The exchange the data belongs to.
        stream_id: StreamId,
        /// The body bytes, already de-framed.
        data: Bytes,
        /// How much connection/stream window this chunk consumed; must be
        /// acknowledged back so the peer's window refills.
        flow_controlled_length: usize,
    },
    /// The peer finished a stream normally.
    StreamEnded {
        /// The finished exchange.
        stream_id: StreamId,
    },
    /// The peer aborted a single stream.
    StreamReset {
        /// The aborted exchange.
        stream_id: StreamId,
    },
    /// More send window is available.
    WindowUpdated {
        /// The exchange whose window grew; 0 means the connection-wide
        /// window, which unblocks every stream.
        stream_id: StreamId,
    },
    /// The peer acknowledged the initial settings; the connection is now
    /// ready to carry exchanges.
    SettingsAcknowledged,
    /// The peer is terminating the whole connection.
    ConnectionTerminated {
        /// Error code carried by the termination frame.
        error_code: u32,
        /// Highest stream id the peer claims to have processed.
        last_stream_id: StreamId,
    },
    /// A frame this codec does not interpret; logged and ignored.
    UnknownFrame,
}

/// The wire-level protocol engine owned by one connection session.
pub trait Codec {
    /// Queue the connection preamble and initial settings for sending.
    fn initiate_connection(&mut self);

    /// Consume inbound bytes, producing the ordered events they decode to.
    ///
    /// An `Err` is a protocol violation and is connection-fatal; the codec
    /// may still have a final frame queued for draining afterwards.
    fn feed(&mut self, data: &[u8]) -> Result<Vec<Event>, ConnectionError>;

    /// Take everything the codec wants written to the transport.
    ///
    /// Must be called after every state-mutating call; returns an empty
    /// buffer when there is nothing pending.
    fn drain_output(&mut self) -> Bytes;

    /// Open a new logical exchange by sending its header block.
    ///
    /// `end_stream` closes the local side immediately for bodyless requests.
    fn send_headers(&mut self, id: StreamId, headers: &[Header], end_stream: bool);

    /// Queue a chunk of request body on an open exchange.
    ///
    /// The caller keeps chunks within [`send_window`] and
    /// [`max_frame_size`]; the codec owns the actual window arithmetic.
    ///
    /// [`send_window`]: #tymethod.send_window
    /// [`max_frame_size`]: #tymethod.max_frame_size
    fn send_data(&mut self, id: StreamId, chunk: &[u8]);

    /// Close the local side of an exchange after its body is fully queued.
    fn end_stream(&mut self, id: StreamId);

    /// How many body bytes may currently be sent on this exchange, as
    /// bounded by both the stream and the connection window.
    fn send_window(&self, id: StreamId) -> usize;

    /// The largest chunk that fits in one outgoing frame.
    fn max_frame_size(&self) -> usize;

    /// Return consumed flow-controlled bytes so the peer's window refills.
    ///
    /// Skipping this stalls the peer's sender once the window drains.
    fn acknowledge_received_data(&mut self, id: StreamId, len: usize);

    /// Abort a single exchange.
    fn reset_stream(&mut self, id: StreamId, code: ErrorCode);

    /// Terminate the whole connection with the given code.
    fn close_connection(&mut self, code: ErrorCode);

    /// The concurrency cap advertised locally.
    fn local_max_concurrent_streams(&self) -> u32;

    /// The concurrency cap advertised by the peer; may shrink at runtime.
    fn remote_max_concurrent_streams(&self) -> u32;
}
