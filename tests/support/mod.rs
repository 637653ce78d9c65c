//! Test support: a scriptable codec and small polling helpers.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};
use futures::{future, Async, Future};

use h2mux::{Codec, ConnectionError, ErrorCode, Event, Header, StreamId};

/// Everything the session asked the codec to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    InitiateConnection,
    SendHeaders(StreamId, bool),
    SendData(StreamId, usize),
    EndStream(StreamId),
    Ack(StreamId, usize),
    ResetStream(StreamId, ErrorCode),
    CloseConnection(ErrorCode),
}

struct Inner {
    scripted: VecDeque<Result<Vec<Event>, ConnectionError>>,
    calls: Vec<Call>,
    local_max: u32,
    remote_max: u32,
    default_window: usize,
    windows: HashMap<StreamId, usize>,
    max_frame: usize,
    out: BytesMut,
}

/// A codec whose inbound events are scripted by the test and whose mutators
/// are recorded. Clones share state so tests keep a handle after moving the
/// codec into a session.
#[derive(Clone)]
pub struct MockCodec {
    inner: Rc<RefCell<Inner>>,
}

impl MockCodec {
    pub fn new() -> MockCodec {
        MockCodec {
            inner: Rc::new(RefCell::new(Inner {
                scripted: VecDeque::new(),
                calls: vec![],
                local_max: 100,
                remote_max: 100,
                default_window: 65535,
                windows: HashMap::new(),
                max_frame: 16384,
                out: BytesMut::new(),
            })),
        }
    }

    /// Queue the events the next `feed` call will produce.
    pub fn script(&self, events: Vec<Event>) {
        self.inner.borrow_mut().scripted.push_back(Ok(events));
    }

    /// Make the next `feed` call report a protocol violation.
    pub fn script_err(&self, err: ConnectionError) {
        self.inner.borrow_mut().scripted.push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    /// Stream ids in the order their header blocks went out.
    pub fn opened(&self) -> Vec<StreamId> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match *call {
                Call::SendHeaders(id, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn set_local_max(&self, max: u32) {
        self.inner.borrow_mut().local_max = max;
    }

    pub fn set_remote_max(&self, max: u32) {
        self.inner.borrow_mut().remote_max = max;
    }

    pub fn set_default_window(&self, window: usize) {
        self.inner.borrow_mut().default_window = window;
    }

    pub fn set_window(&self, id: StreamId, window: usize) {
        self.inner.borrow_mut().windows.insert(id, window);
    }
}

impl Codec for MockCodec {
    fn initiate_connection(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(Call::InitiateConnection);
        inner.out.extend_from_slice(b"PREFACE");
    }

    fn feed(&mut self, _data: &[u8]) -> Result<Vec<Event>, ConnectionError> {
        self.inner
            .borrow_mut()
            .scripted
            .pop_front()
            .unwrap_or_else(|| Ok(vec![]))
    }

    fn drain_output(&mut self) -> Bytes {
        self.inner.borrow_mut().out.take().freeze()
    }

    fn send_headers(&mut self, id: StreamId, _headers: &[Header], end_stream: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(Call::SendHeaders(id, end_stream));
        inner.out.extend_from_slice(b"HEADERS");
    }

    fn send_data(&mut self, id: StreamId, chunk: &[u8]) {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        inner.calls.push(Call::SendData(id, chunk.len()));
        let default = inner.default_window;
        let w = inner.windows.entry(id).or_insert(default);
        *w = w.saturating_sub(chunk.len());
        inner.out.extend_from_slice(chunk);
    }

    fn end_stream(&mut self, id: StreamId) {
        self.inner.borrow_mut().calls.push(Call::EndStream(id));
    }

    fn send_window(&self, id: StreamId) -> usize {
        let inner = self.inner.borrow();
        inner.windows.get(&id).cloned().unwrap_or(inner.default_window)
    }

    fn max_frame_size(&self) -> usize {
        self.inner.borrow().max_frame
    }

    fn acknowledge_received_data(&mut self, id: StreamId, len: usize) {
        self.inner.borrow_mut().calls.push(Call::Ack(id, len));
    }

    fn reset_stream(&mut self, id: StreamId, code: ErrorCode) {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(Call::ResetStream(id, code));
        inner.out.extend_from_slice(b"RST");
    }

    fn close_connection(&mut self, code: ErrorCode) {
        let mut inner = self.inner.borrow_mut();
        inner.calls.push(Call::CloseConnection(code));
        inner.out.extend_from_slice(b"GOAWAY");
    }

    fn local_max_concurrent_streams(&self) -> u32 {
        self.inner.borrow().local_max
    }

    fn remote_max_concurrent_streams(&self) -> u32 {
        self.inner.borrow().remote_max
    }
}

/// Poll a future once inside a task context; `None` means not ready.
pub fn poll_now<F: Future>(f: &mut F) -> Option<Result<F::Item, F::Error>> {
    let polled = future::lazy(|| {
        let res: Result<_, ()> = Ok(f.poll());
        res
    }).wait()
      .unwrap();

    match polled {
        Ok(Async::Ready(item)) => Some(Ok(item)),
        Ok(Async::NotReady) => None,
        Err(e) => Some(Err(e)),
    }
}

/// Convenience event constructors mirroring the codec vocabulary.
pub fn headers(id: StreamId, status: &str) -> Event {
    Event::HeadersReceived {
        stream_id: id,
        headers: vec![(":status".to_string(), status.to_string())],
    }
}

pub fn data(id: StreamId, body: &[u8]) -> Event {
    Event::DataReceived {
        stream_id: id,
        data: Bytes::from(body.to_vec()),
        flow_controlled_length: body.len(),
    }
}

pub fn ended(id: StreamId) -> Event {
    Event::StreamEnded { stream_id: id }
}

pub fn reset(id: StreamId) -> Event {
    Event::StreamReset { stream_id: id }
}

pub fn window(id: StreamId) -> Event {
    Event::WindowUpdated { stream_id: id }
}

pub fn settings_ack() -> Event {
    Event::SettingsAcknowledged
}
