//! Binding a session to a reactor.
//!
//! `bind` takes an established transport, wires a [`Session`] to it, spawns
//! the connection task on the reactor and hands back a cheaply clonable
//! client handle. The task owns the transport exclusively: it drains
//! submitted exchanges into the session, feeds inbound bytes through it,
//! keeps the idle timer honest, and flushes whatever the codec wants on the
//! wire after every step.
//!
//! [`Session`]: struct.Session.html

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use futures::{Async, Future, Poll, Stream};
use futures::sync::oneshot;
use tokio_core::reactor::{Handle, Timeout};
use tokio_io::{AsyncRead, AsyncWrite};

use codec::Codec;
use error::{ConnectionError, StreamError};
use message::{Config, Request, Response};
use session::Session;
use util::client_proxy::{self, ClientProxy};

/// Caller-facing handle to one connection; implements `tokio_service`'s
/// `Service`, resolving each call to the exchange's response or its typed
/// failure. Clones share the connection.
pub type Client = ClientProxy<Request, Response, StreamError>;

/// Future returned by `Client::call`.
pub type ResponseFuture = client_proxy::Response<Response, StreamError>;

/// Single-fire notification carrying the accumulated teardown causes, for
/// callers that want to evict the connection from a pool the moment it dies.
pub type LostNotify = oneshot::Sender<Arc<Vec<ConnectionError>>>;

/// Bind a connection: spawn the driver task on the reactor and return the
/// client handle.
///
/// `peer` is recorded for logging. `negotiated` is the ALPN outcome when the
/// transport is TLS; anything but `h2` tears the connection down before a
/// single exchange starts. Pass `None` for prior-knowledge plaintext.
pub fn bind<T, C>(handle: &Handle,
                  io: T,
                  peer: Option<SocketAddr>,
                  negotiated: Option<&str>,
                  codec: C,
                  config: Config,
                  lost_tx: Option<LostNotify>)
                  -> Client
    where T: AsyncRead + AsyncWrite + 'static,
          C: Codec + 'static,
{
    let (client, rx) = client_proxy::pair();

    let idle = config.idle_timeout;
    let mut session = Session::new(codec, config);

    // Check the handshake before emitting the preamble: a mismatched
    // protocol owes the peer nothing, not even a termination frame.
    if let Some(proto) = negotiated {
        session.on_handshake_complete(Some(proto));
    }
    if !session.wants_close() {
        session.on_connected(peer);
    }

    let task = Connection {
        io: io,
        session: session,
        requests: rx,
        requests_done: false,
        handle: handle.clone(),
        idle: idle,
        timeout: None,
        write_buf: BytesMut::new(),
        lost_tx: lost_tx,
        state: State::Running,
    };

    handle.spawn(task.map_err(|e| {
        debug!("connection task failed; err={}", e);
    }));

    client
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    /// Normal operation.
    Running,
    /// Flush remaining output, shut the transport down, then tear down.
    Closing,
    /// Teardown ran; the task is finished.
    Done,
}

/// The spawned task driving one connection.
struct Connection<T, C>
    where T: AsyncRead + AsyncWrite,
          C: Codec,
{
    io: T,
    session: Session<C>,
    requests: client_proxy::Receiver<Request, Response, StreamError>,
    requests_done: bool,
    handle: Handle,
    idle: Duration,
    timeout: Option<Timeout>,
    write_buf: BytesMut,
    lost_tx: Option<LostNotify>,
    state: State,
}

impl<T, C> Connection<T, C>
    where T: AsyncRead + AsyncWrite,
          C: Codec,
{
    /// Run teardown exactly once and fire the lost notification.
    fn finish(&mut self, cause: Option<ConnectionError>) {
        if let Some(causes) = self.session.on_connection_lost(cause) {
            if let Some(tx) = self.lost_tx.take() {
                let _ = tx.send(causes);
            }
        }
        self.state = State::Done;
    }

    fn reset_idle(&mut self) {
        if let Some(ref mut timeout) = self.timeout {
            timeout.reset(Instant::now() + self.idle);
        }
    }

    /// Drain submitted exchanges into the session.
    fn poll_requests(&mut self) {
        while self.state == State::Running {
            match self.requests.poll() {
                Ok(Async::Ready(Some((request, completion)))) => {
                    trace!("   --> received request");
                    self.session.submit(request, completion);
                }
                Ok(Async::Ready(None)) | Err(()) => {
                    trace!("   --> client dropped");
                    self.requests_done = true;
                    return;
                }
                Ok(Async::NotReady) => return,
            }
        }
    }

    /// Read inbound bytes into the session until the transport blocks.
    fn poll_read(&mut self) {
        let mut buf = [0u8; 8 * 1024];
        while self.state == State::Running {
            match self.io.read(&mut buf) {
                Ok(0) => {
                    debug!("transport closed by peer");
                    let cause = if self.session.wants_close() {
                        // We asked for this close; nothing abnormal.
                        None
                    } else {
                        Some(ConnectionError::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed by peer")))
                    };
                    self.finish(cause);
                    return;
                }
                Ok(n) => {
                    trace!("   --> read {} bytes", n);
                    self.reset_idle();
                    self.session.on_data(&buf[..n]);
                    if self.session.wants_close() {
                        return;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    debug!("transport read error; err={}", e);
                    self.finish(Some(ConnectionError::Io(e)));
                    return;
                }
            }
        }
    }

    /// Lazily arm the idle timer, then check it.
    fn poll_timeout(&mut self) {
        if self.state != State::Running {
            return;
        }
        if self.timeout.is_none() {
            match Timeout::new(self.idle, &self.handle) {
                Ok(timeout) => self.timeout = Some(timeout),
                Err(e) => {
                    self.finish(Some(ConnectionError::Io(e)));
                    return;
                }
            }
        }

        let fired = match self.timeout {
            Some(ref mut timeout) => match timeout.poll() {
                Ok(Async::Ready(())) => true,
                Ok(Async::NotReady) => false,
                Err(_) => true,
            },
            None => false,
        };

        if fired {
            debug!("idle timeout fired");
            self.session.on_idle_timeout();
        }
    }

    fn fill_write_buf(&mut self) {
        let out = self.session.take_output();
        if !out.is_empty() {
            self.write_buf.extend_from_slice(&out);
        }
    }

    /// Push buffered output to the transport until it blocks or drains.
    fn write_some(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.io.write(&self.write_buf) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero,
                                              "transport refused bytes"));
                }
                Ok(n) => {
                    trace!("   --> wrote {} bytes", n);
                    self.reset_idle();
                    let _ = self.write_buf.split_to(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        match self.io.flush() {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl<T, C> Future for Connection<T, C>
    where T: AsyncRead + AsyncWrite,
          C: Codec,
{
    type Item = ();
    type Error = io::Error;

    fn poll(&mut self) -> Poll<(), io::Error> {
        trace!("Connection::poll");

        loop {
            match self.state {
                State::Running => {
                    self.poll_requests();
                    self.poll_read();
                    self.poll_timeout();
                    if self.state != State::Running {
                        continue;
                    }

                    self.fill_write_buf();
                    if let Err(e) = self.write_some() {
                        debug!("transport write error; err={}", e);
                        self.finish(Some(ConnectionError::Io(e)));
                        continue;
                    }

                    if self.session.wants_close() {
                        self.state = State::Closing;
                        continue;
                    }
                    if self.requests_done && self.session.is_empty() {
                        // Every handle is gone and nothing is in flight:
                        // close cooperatively.
                        self.session.shutdown();
                        self.state = State::Closing;
                        continue;
                    }

                    return Ok(Async::NotReady);
                }
                State::Closing => {
                    self.fill_write_buf();
                    if let Err(e) = self.write_some() {
                        // The final frames are best effort.
                        debug!("write error during close; err={}", e);
                        self.finish(None);
                        continue;
                    }
                    if !self.write_buf.is_empty() {
                        return Ok(Async::NotReady);
                    }
                    match self.io.shutdown() {
                        Ok(Async::NotReady) => return Ok(Async::NotReady),
                        Ok(Async::Ready(())) | Err(_) => {}
                    }
                    self.finish(None);
                }
                State::Done => return Ok(Async::Ready(())),
            }
        }
    }
}

impl<T, C> Drop for Connection<T, C>
    where T: AsyncRead + AsyncWrite,
          C: Codec,
{
    fn drop(&mut self) {
        if !self.session.is_closed() && !self.session.is_empty() {
            warn!("connection task dropping with exchanges in flight");
        }
        // Everything still registered resolves exactly once even if the
        // reactor drops us mid-flight.
        if let Some(causes) = self.session.on_connection_lost(Some(broken_pipe())) {
            if let Some(tx) = self.lost_tx.take() {
                let _ = tx.send(causes);
            }
        }
    }
}

fn broken_pipe() -> ConnectionError {
    ConnectionError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
}
