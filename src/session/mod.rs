//! Dispatch for multiplexed exchanges on one connection.
//!
//! This module contains the per-connection core: the stream registry, the
//! FIFO admission queue, and the session that turns codec events into stream
//! transitions.
//!
//! ## Multiplexing
//!
//! Many request/response exchanges share one ordered byte-stream to a single
//! peer. The protocol caps how many may be open at once, so exchanges that
//! arrive faster than the peer permits wait in a queue and are admitted in
//! strict submission order as capacity frees up.
//!
//! ## Considerations
//!
//! The session is sans-io: it never reads or writes a socket. A driver feeds
//! it inbound bytes, drains its pending output after every call, and reports
//! transport-level transitions (established, idle timeout, lost). Everything
//! here runs without preemption for one connection, so the registry and the
//! counters need no locks.

mod stream;

pub use self::stream::{CloseReason, CompletionHandle, CompletionSender, Stream, StreamState};

use bytes::Bytes;
use futures::sync::oneshot;

use std::cmp;
use std::collections::{HashMap, VecDeque};
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;

use codec::{Codec, ErrorCode, Event, StreamId};
use error::ConnectionError;
use message::{Config, Request};

/// The protocol this session expects the TLS layer to have negotiated.
const EXPECTED_PROTOCOL: &'static str = "h2";

/// Single authority for one connection: stream-id allocation, admission
/// control, event dispatch and connection-level failure handling.
///
/// The session exclusively owns its codec and all per-stream state. Nothing
/// else writes to either, which keeps the admission pass and event dispatch
/// free of races by construction.
pub struct Session<C> {
    codec: C,
    config: Config,

    /// Next client-initiated stream id; odd, never reused.
    next_stream_id: StreamId,
    streams: HashMap<StreamId, Stream>,
    /// Exchanges waiting for admission, in submission order.
    pending: VecDeque<StreamId>,
    /// Exchanges currently admitted; never exceeds the negotiated cap.
    active_streams: usize,

    /// False until the peer acknowledges our initial settings.
    settings_acknowledged: bool,
    transport_connected: bool,
    peer_addr: Option<SocketAddr>,

    /// Teardown causes accumulated before the transport is finally gone.
    lost_errors: Vec<ConnectionError>,
    /// The driver should flush and drop the transport.
    close_requested: bool,
    /// Teardown ran; the session is inert.
    closed: bool,
}

impl<C: Codec> Session<C> {
    /// A session around a fresh codec instance.
    pub fn new(codec: C, config: Config) -> Session<C> {
        Session {
            codec: codec,
            config: config,
            next_stream_id: 1,
            streams: HashMap::new(),
            pending: VecDeque::new(),
            active_streams: 0,
            settings_acknowledged: false,
            transport_connected: false,
            peer_addr: None,
            lost_errors: vec![],
            close_requested: false,
            closed: false,
        }
    }

    /// Submit an exchange, fulfilling `completion` when it resolves.
    ///
    /// Never blocks: the exchange is registered, queued, and admitted on this
    /// or a later admission pass. Submissions that arrive before the peer
    /// acknowledges settings simply wait in the queue.
    pub fn submit(&mut self, request: Request, completion: CompletionSender) {
        if self.closed {
            // The connection is already gone; the exchange never starts.
            debug!("submit on closed session");
            let _ = completion.send(Err(::error::StreamError::Inactive));
            return;
        }

        let id = self.next_stream_id;
        self.next_stream_id += 2;

        let mut stream = Stream::new(id,
                                     request,
                                     completion,
                                     self.config.max_response_size,
                                     self.config.warn_response_size);
        stream.enqueued();
        self.streams.insert(id, stream);
        self.pending.push_back(id);
        trace!("submitted exchange; id={}; pending={}", id, self.pending.len());

        self.admit_pending();
    }

    /// `submit` with the completion pair built in; returns the caller's half.
    pub fn request(&mut self, request: Request) -> CompletionHandle {
        let (tx, rx) = oneshot::channel();
        self.submit(request, tx);
        rx
    }

    /// The transport is up: record the peer and emit the connection preamble.
    pub fn on_connected(&mut self, peer: Option<SocketAddr>) {
        debug!("connection made; peer={:?}", peer);
        self.transport_connected = true;
        self.peer_addr = peer;
        self.codec.initiate_connection();
    }

    /// The TLS handshake finished; anything but the expected protocol is
    /// connection-fatal. The preamble may not be out yet, so no termination
    /// frame is owed to the peer.
    pub fn on_handshake_complete(&mut self, negotiated: Option<&str>) {
        if negotiated == Some(EXPECTED_PROTOCOL) {
            return;
        }
        let got = negotiated.unwrap_or("<none>").to_string();
        debug!("negotiated protocol mismatch; got={:?}", got);
        self.lost_errors.push(ConnectionError::InvalidNegotiatedProtocol(got));
        self.close_requested = true;
    }

    /// Feed inbound bytes and dispatch the events they decode to, strictly
    /// in the order produced.
    ///
    /// A codec-reported protocol violation is connection-fatal, but output
    /// is still left for draining: some violations require a final outgoing
    /// frame before the transport drops.
    pub fn on_data(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }

        let events = match self.codec.feed(data) {
            Ok(events) => events,
            Err(e) => {
                debug!("protocol violation; err={}", e);
                self.lost_errors.push(e);
                self.close_requested = true;
                return;
            }
        };

        for event in events {
            self.dispatch(event);
        }
    }

    /// The idle timer fired. Pick the termination code, queue the final
    /// frame, and ask the driver to drop the transport.
    ///
    /// Any registered exchange, queued or admitted, makes this an abnormal
    /// shutdown; only a fully quiet connection closes cooperatively.
    pub fn on_idle_timeout(&mut self) {
        if self.closed {
            return;
        }

        let code = if !self.streams.is_empty() || self.active_streams > 0 {
            ErrorCode::ProtocolError
        } else {
            ErrorCode::NoError
        };
        debug!("idle timeout; code={:?}", code);

        self.codec.close_connection(code);
        self.lost_errors.push(ConnectionError::IdleTimeout(self.config.idle_timeout));
        self.close_requested = true;
    }

    /// The transport is gone. Force-close every remaining exchange exactly
    /// once and hand back the accumulated causes for the one-shot
    /// connection-lost notification.
    ///
    /// Idempotent: a second call after teardown returns `None` and does
    /// nothing.
    pub fn on_connection_lost(&mut self,
                              cause: Option<ConnectionError>)
                              -> Option<Arc<Vec<ConnectionError>>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.transport_connected = false;

        if let Some(cause) = cause {
            self.lost_errors.push(cause);
        }
        let causes = Arc::new(mem::replace(&mut self.lost_errors, vec![]));
        debug!("connection lost; streams={}; causes={}",
               self.streams.len(),
               causes.len());

        for (_, mut stream) in self.streams.drain() {
            if stream.request_sent() {
                stream.close(CloseReason::ConnectionLost, Some(causes.clone()));
            } else {
                stream.close(CloseReason::Inactive, None);
            }
        }
        self.pending.clear();
        self.active_streams = 0;

        Some(causes)
    }

    /// Request a cooperative shutdown: queue the final frame and ask the
    /// driver to flush and drop the transport.
    pub fn shutdown(&mut self) {
        if self.closed || self.close_requested {
            return;
        }
        debug!("cooperative shutdown");
        self.codec.close_connection(ErrorCode::NoError);
        self.close_requested = true;
    }

    /// Bytes the codec wants on the wire. Drained by the driver after every
    /// session call.
    pub fn take_output(&mut self) -> Bytes {
        self.codec.drain_output()
    }

    /// Whether the driver should flush remaining output and drop the
    /// transport.
    pub fn wants_close(&self) -> bool {
        self.close_requested
    }

    /// Whether teardown already ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether any exchange is still registered, queued or admitted.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// The cap on concurrently admitted exchanges. Recomputed on every use:
    /// either side may lower its advertised limit at runtime.
    fn allowed_concurrency(&self) -> usize {
        cmp::min(self.codec.local_max_concurrent_streams(),
                 self.codec.remote_max_concurrent_streams()) as usize
    }

    /// Admit queued exchanges in strict FIFO order while capacity and
    /// readiness allow. Runs after every admission-relevant event: a new
    /// submission, a stream closing, settings acknowledgment.
    fn admit_pending(&mut self) {
        while !self.pending.is_empty()
              && self.active_streams < self.allowed_concurrency()
              && self.is_ready() {
            let id = match self.pending.pop_front() {
                Some(id) => id,
                None => return,
            };
            match self.streams.get_mut(&id) {
                Some(stream) => {
                    self.active_streams += 1;
                    trace!("admitting stream; id={}; active={}", id, self.active_streams);
                    stream.initiate(&mut self.codec);
                }
                // Closed while queued; nothing was admitted.
                None => continue,
            }
        }
    }

    /// Ready to carry exchanges: transport open and settings acknowledged.
    fn is_ready(&self) -> bool {
        self.transport_connected && self.settings_acknowledged
    }

    /// Drop a finished stream from the registry, free its admission slot and
    /// immediately offer the capacity to the next queued exchange.
    fn pop_stream(&mut self, id: StreamId) -> Option<Stream> {
        let stream = self.streams.remove(&id);
        if let Some(ref stream) = stream {
            if stream.request_sent() {
                self.active_streams -= 1;
            }
            self.admit_pending();
        }
        stream
    }

    /// Apply one codec event. Events for unknown stream ids are logged and
    /// ignored: the codec validates ids upstream, and a straggler after a
    /// local reset must not take the session down.
    fn dispatch(&mut self, event: Event) {
        match event {
            Event::HeadersReceived { stream_id, headers } => {
                match self.streams.get_mut(&stream_id) {
                    Some(stream) => stream.receive_headers(headers),
                    None => debug!("headers for unknown stream; id={}", stream_id),
                }
            }
            Event::DataReceived { stream_id, data, flow_controlled_length } => {
                let oversized = match self.streams.get_mut(&stream_id) {
                    Some(stream) => {
                        stream.receive_data(&data, flow_controlled_length, &mut self.codec)
                              .err()
                    }
                    None => {
                        debug!("data for unknown stream; id={}", stream_id);
                        None
                    }
                };
                if let Some(err) = oversized {
                    // Cut the stream off locally; its siblings are unaffected.
                    self.codec.reset_stream(stream_id, ErrorCode::RefusedStream);
                    if let Some(mut stream) = self.pop_stream(stream_id) {
                        stream.fail(err);
                    }
                }
            }
            Event::StreamEnded { stream_id } => {
                match self.pop_stream(stream_id) {
                    Some(mut stream) => stream.close(CloseReason::Ended, None),
                    None => debug!("end for unknown stream; id={}", stream_id),
                }
            }
            Event::StreamReset { stream_id } => {
                match self.pop_stream(stream_id) {
                    Some(mut stream) => stream.close(CloseReason::Reset, None),
                    None => debug!("reset for unknown stream; id={}", stream_id),
                }
            }
            Event::WindowUpdated { stream_id } => {
                if stream_id == 0 {
                    // Connection-wide window: every stream may have body
                    // blocked on it.
                    for (_, stream) in self.streams.iter_mut() {
                        stream.receive_window_update(&mut self.codec);
                    }
                } else {
                    match self.streams.get_mut(&stream_id) {
                        Some(stream) => stream.receive_window_update(&mut self.codec),
                        None => debug!("window update for unknown stream; id={}", stream_id),
                    }
                }
            }
            Event::SettingsAcknowledged => {
                debug!("settings acknowledged");
                self.settings_acknowledged = true;
                self.admit_pending();
            }
            Event::ConnectionTerminated { error_code, last_stream_id } => {
                debug!("remote terminated connection; peer={:?}; error_code={}",
                       self.peer_addr, error_code);
                self.lost_errors.push(ConnectionError::RemoteTerminated {
                    error_code: error_code,
                    last_stream_id: last_stream_id,
                });
                self.close_requested = true;
            }
            Event::UnknownFrame => {
                debug!("unknown frame received");
            }
        }
    }
}
