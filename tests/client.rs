//! Driver tests: the spawned connection task against a scripted transport.

extern crate bytes;
extern crate env_logger;
extern crate futures;
extern crate h2mux;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_service;

mod support;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use futures::{Async, Future, Poll};
use futures::sync::oneshot;
use tokio_core::reactor::Core;
use tokio_io::{AsyncRead, AsyncWrite};
use tokio_service::Service;

use h2mux::{bind, Config, Request, StreamError};

use support::{data, ended, headers, settings_ack, MockCodec};

/// In-memory transport: scripted inbound chunks, captured outbound bytes.
struct ScriptTransport {
    reads: VecDeque<Vec<u8>>,
    written: Rc<RefCell<Vec<u8>>>,
    eof: bool,
}

impl ScriptTransport {
    fn new(reads: Vec<&[u8]>, eof: bool) -> (ScriptTransport, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(vec![]));
        let transport = ScriptTransport {
            reads: reads.into_iter().map(|c| c.to_vec()).collect(),
            written: written.clone(),
            eof: eof,
        };
        (transport, written)
    }
}

impl Read for ScriptTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(chunk) => {
                assert!(chunk.len() <= buf.len());
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None if self.eof => Ok(0),
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no more reads")),
        }
    }
}

impl Write for ScriptTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for ScriptTransport {}

impl AsyncWrite for ScriptTransport {
    fn shutdown(&mut self) -> Poll<(), io::Error> {
        Ok(Async::Ready(()))
    }
}

fn get() -> Request {
    Request::new(vec![(":method".to_string(), "GET".to_string()),
                      (":path".to_string(), "/".to_string())])
}

#[test]
fn full_exchange_over_the_reactor() {
    drop(env_logger::init());

    let mut core = Core::new().unwrap();
    let codec = MockCodec::new();

    // First chunk acknowledges settings, second carries the response.
    codec.script(vec![settings_ack()]);
    codec.script(vec![headers(1, "200"), data(1, b"hello"), ended(1)]);
    let (transport, written) = ScriptTransport::new(vec![b"ack", b"response"], false);

    let client = bind(&core.handle(),
                      transport,
                      None,
                      Some("h2"),
                      codec.clone(),
                      Config::default(),
                      None);

    let response = core.run(client.call(get())).unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"hello");

    // The preamble and the request frames reached the wire.
    let written = written.borrow();
    assert!(written.starts_with(b"PREFACE"));
    assert!(written.windows(7).any(|w| w == b"HEADERS"));
}

#[test]
fn transport_eof_fails_queued_exchanges_and_notifies() {
    let mut core = Core::new().unwrap();
    let codec = MockCodec::new();

    // No settings ack ever arrives; the transport just closes.
    let (transport, _written) = ScriptTransport::new(vec![], true);
    let (lost_tx, lost_rx) = oneshot::channel();

    let client = bind(&core.handle(),
                      transport,
                      None,
                      Some("h2"),
                      codec.clone(),
                      Config::default(),
                      Some(lost_tx));

    let response = client.call(get());
    match core.run(response) {
        Err(StreamError::Inactive) => {}
        other => panic!("expected inactive, got {:?}", other),
    }

    let causes = core.run(lost_rx).unwrap();
    assert_eq!(causes.len(), 1);
}

#[test]
fn dropping_every_handle_closes_cooperatively() {
    let mut core = Core::new().unwrap();
    let codec = MockCodec::new();

    let (transport, written) = ScriptTransport::new(vec![], false);
    let (lost_tx, lost_rx) = oneshot::channel();

    let client = bind(&core.handle(),
                      transport,
                      None,
                      Some("h2"),
                      codec.clone(),
                      Config::default(),
                      Some(lost_tx));
    drop(client);

    let causes = core.run(lost_rx).unwrap();
    assert!(causes.is_empty());
    assert!(written.borrow().ends_with(b"GOAWAY"));
}

#[test]
fn mismatched_alpn_never_sends_the_preamble() {
    let mut core = Core::new().unwrap();
    let codec = MockCodec::new();

    let (transport, written) = ScriptTransport::new(vec![], false);
    let (lost_tx, lost_rx) = oneshot::channel();

    let client = bind(&core.handle(),
                      transport,
                      None,
                      Some("http/1.1"),
                      codec.clone(),
                      Config::default(),
                      Some(lost_tx));

    let response = client.call(get());
    match core.run(response) {
        Err(StreamError::Inactive) => {}
        other => panic!("expected inactive, got {:?}", other),
    }

    let causes = core.run(lost_rx).unwrap();
    assert_eq!(causes.len(), 1);
    assert!(written.borrow().is_empty());
}
