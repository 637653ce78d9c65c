//! Per-exchange state machine.
//!
//! A `Stream` owns everything about one request/response pair: the buffered
//! request body still waiting for send window, the partially accumulated
//! response, and the single-assignment completion the caller is watching.
//! It never touches session-owned bookkeeping; the session tells it when to
//! start and when to close, and hands it the codec for the calls it needs.

use bytes::BytesMut;
use futures::sync::oneshot;

use std::cmp;
use std::sync::Arc;

use codec::{Codec, Header, StreamId};
use error::{ConnectionError, StreamError};
use message::{Request, Response};

/// Sending half of an exchange's completion. Fulfilled exactly once.
pub type CompletionSender = oneshot::Sender<Result<Response, StreamError>>;

/// Receiving half of an exchange's completion, handed back to the caller.
pub type CompletionHandle = oneshot::Receiver<Result<Response, StreamError>>;

/// Lifecycle of one exchange on the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Registered, not yet queued.
    Created,
    /// Queued, waiting for admission under the concurrency cap.
    Pending,
    /// Admitted; request headers sent, body still going out.
    Open,
    /// Local side done; waiting on the peer's response to finish.
    HalfClosedLocal,
    /// Finished. No operation may run on the stream any more.
    Closed,
}

/// Why an exchange closed. Set exactly once, on entering `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The exchange finished normally.
    Ended,
    /// Either side aborted this one exchange.
    Reset,
    /// The whole connection died after the request went out.
    ConnectionLost,
    /// The whole connection died while this exchange was still queued.
    Inactive,
}

/// One request/response exchange multiplexed on the shared connection.
pub struct Stream {
    id: StreamId,
    state: StreamState,
    request: Request,
    /// How much of the request body has been handed to the codec.
    body_offset: usize,
    request_sent: bool,
    completion: Option<CompletionSender>,
    response_status: u16,
    response_headers: Vec<Header>,
    response_body: BytesMut,
    max_response_size: usize,
    warn_response_size: usize,
    warned: bool,
}

impl Stream {
    /// A freshly registered exchange in `Created` state.
    pub fn new(id: StreamId,
               request: Request,
               completion: CompletionSender,
               max_response_size: usize,
               warn_response_size: usize)
               -> Stream {
        Stream {
            id: id,
            state: StreamState::Created,
            request: request,
            body_offset: 0,
            request_sent: false,
            completion: Some(completion),
            response_status: 0,
            response_headers: vec![],
            response_body: BytesMut::new(),
            max_response_size: max_response_size,
            warn_response_size: warn_response_size,
            warned: false,
        }
    }

    /// The exchange's id on the connection.
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the request frames were ever handed to the codec. Decides
    /// between `ConnectionLost` and `Inactive` at teardown.
    pub fn request_sent(&self) -> bool {
        self.request_sent
    }

    /// Mark the exchange queued for admission.
    pub fn enqueued(&mut self) {
        debug_assert_eq!(self.state, StreamState::Created);
        self.state = StreamState::Pending;
    }

    /// Admit the exchange: send the request headers and as much body as the
    /// current send window allows. Only valid from `Pending`.
    pub fn initiate<C: Codec>(&mut self, codec: &mut C) {
        debug_assert_eq!(self.state, StreamState::Pending);
        trace!("initiating stream; id={}", self.id);

        let bodyless = self.request.body.is_empty();
        codec.send_headers(self.id, &self.request.headers, bodyless);
        self.request_sent = true;

        if bodyless {
            self.state = StreamState::HalfClosedLocal;
        } else {
            self.state = StreamState::Open;
            self.push_body(codec);
        }
    }

    /// Push buffered request body, bounded by the codec's send window and
    /// frame size; ends the local side once the body is fully queued.
    fn push_body<C: Codec>(&mut self, codec: &mut C) {
        while self.body_offset < self.request.body.len() {
            let window = cmp::min(codec.send_window(self.id), codec.max_frame_size());
            if window == 0 {
                trace!("send window empty; id={}; remaining={}",
                       self.id,
                       self.request.body.len() - self.body_offset);
                return;
            }

            let end = cmp::min(self.body_offset + window, self.request.body.len());
            codec.send_data(self.id, &self.request.body[self.body_offset..end]);
            self.body_offset = end;
        }

        codec.end_stream(self.id);
        self.state = StreamState::HalfClosedLocal;
    }

    /// Record the response header block.
    pub fn receive_headers(&mut self, headers: Vec<Header>) {
        if self.state == StreamState::Closed {
            return;
        }

        if let Some(&(_, ref value)) = headers.iter().find(|&&(ref n, _)| n == ":status") {
            match value.parse() {
                Ok(status) => self.response_status = status,
                Err(_) => debug!("unparseable :status; id={}; value={:?}", self.id, value),
            }
        }
        self.response_headers = headers;
    }

    /// Buffer a chunk of response body and acknowledge its flow-controlled
    /// length so the peer's window refills.
    ///
    /// Fails once the accumulated body passes the configured size limit; the
    /// session then resets the stream and fails the completion.
    pub fn receive_data<C: Codec>(&mut self,
                                  data: &[u8],
                                  flow_controlled_length: usize,
                                  codec: &mut C)
                                  -> Result<(), StreamError> {
        if self.state == StreamState::Closed {
            return Ok(());
        }

        self.response_body.extend_from_slice(data);
        codec.acknowledge_received_data(self.id, flow_controlled_length);

        let received = self.response_body.len();

        if self.max_response_size > 0 && received > self.max_response_size {
            return Err(StreamError::ResponseTooLarge {
                received: received,
                limit: self.max_response_size,
            });
        }

        if self.warn_response_size > 0 && received > self.warn_response_size && !self.warned {
            self.warned = true;
            warn!("response body passed {} bytes; id={}; received={}",
                  self.warn_response_size, self.id, received);
        }

        Ok(())
    }

    /// The send window grew; push any request body it was blocking.
    pub fn receive_window_update<C: Codec>(&mut self, codec: &mut C) {
        if self.state == StreamState::Open {
            self.push_body(codec);
        }
    }

    /// Close the exchange and fulfill its completion.
    ///
    /// Idempotent: both the event-driven path (ended/reset) and connection
    /// teardown may race to close the same stream, and the second call must
    /// be a no-op.
    pub fn close(&mut self, reason: CloseReason, causes: Option<Arc<Vec<ConnectionError>>>) {
        if self.state == StreamState::Closed {
            return;
        }
        self.state = StreamState::Closed;
        trace!("closing stream; id={}; reason={:?}", self.id, reason);

        let result = match reason {
            CloseReason::Ended => Ok(Response {
                status: self.response_status,
                headers: ::std::mem::replace(&mut self.response_headers, vec![]),
                body: self.response_body.take().freeze(),
            }),
            CloseReason::Reset => Err(StreamError::Reset),
            CloseReason::ConnectionLost => {
                Err(StreamError::ConnectionLost(causes.unwrap_or_else(|| Arc::new(vec![]))))
            }
            CloseReason::Inactive => Err(StreamError::Inactive),
        };

        if let Some(completion) = self.completion.take() {
            // The caller may have dropped its handle; that is fine.
            let _ = completion.send(result);
        }
    }

    /// Close the exchange with a specific per-stream failure, e.g. the
    /// oversized-response guard. Idempotent like `close`.
    pub fn fail(&mut self, err: StreamError) {
        if self.state == StreamState::Closed {
            return;
        }
        self.state = StreamState::Closed;
        trace!("failing stream; id={}; err={}", self.id, err);

        if let Some(completion) = self.completion.take() {
            let _ = completion.send(Err(err));
        }
    }
}
