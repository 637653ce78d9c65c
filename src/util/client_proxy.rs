//! Handle pair connecting callers to a spawned connection task.
//!
//! Callers keep the `ClientProxy` and submit exchanges through its
//! `Service` impl; the connection task drains the paired `Receiver` and
//! fulfills each exchange's oneshot when it resolves.

use std::fmt;

use futures::{Async, Future, Poll, Stream};
use futures::sync::mpsc;
use futures::sync::oneshot;
use tokio_service::Service;

/// What travels to the connection task: the request plus the sender its
/// outcome is fulfilled through.
pub type Envelope<R, S, E> = (R, oneshot::Sender<Result<S, E>>);

/// Create a linked proxy/receiver pair.
pub fn pair<R, S, E>() -> (ClientProxy<R, S, E>, Receiver<R, S, E>) {
    let (tx, rx) = mpsc::unbounded();
    (ClientProxy { tx: tx }, Receiver { rx: rx })
}

/// Caller-facing handle to a connection task. Clones share the connection.
pub struct ClientProxy<R, S, E> {
    tx: mpsc::UnboundedSender<Envelope<R, S, E>>,
}

impl<R, S, E> Clone for ClientProxy<R, S, E> {
    fn clone(&self) -> ClientProxy<R, S, E> {
        ClientProxy { tx: self.tx.clone() }
    }
}

impl<R, S, E> Service for ClientProxy<R, S, E>
    where E: From<oneshot::Canceled>,
{
    type Request = R;
    type Response = S;
    type Error = E;
    type Future = Response<S, E>;

    fn call(&self, request: R) -> Response<S, E> {
        let (tx, rx) = oneshot::channel();

        // If the connection task is already gone, the envelope (and with it
        // the sender) is dropped here and the oneshot resolves canceled.
        let _ = self.tx.unbounded_send((request, tx));

        Response { inner: rx }
    }
}

impl<R, S, E> fmt::Debug for ClientProxy<R, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClientProxy {{ .. }}")
    }
}

/// The connection task's end: a stream of submitted envelopes, ending when
/// every proxy clone is dropped.
pub struct Receiver<R, S, E> {
    rx: mpsc::UnboundedReceiver<Envelope<R, S, E>>,
}

impl<R, S, E> Stream for Receiver<R, S, E> {
    type Item = Envelope<R, S, E>;
    type Error = ();

    fn poll(&mut self) -> Poll<Option<Envelope<R, S, E>>, ()> {
        self.rx.poll()
    }
}

impl<R, S, E> fmt::Debug for Receiver<R, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Receiver {{ .. }}")
    }
}

/// Future of one exchange's outcome.
pub struct Response<S, E> {
    inner: oneshot::Receiver<Result<S, E>>,
}

impl<S, E> Future for Response<S, E>
    where E: From<oneshot::Canceled>,
{
    type Item = S;
    type Error = E;

    fn poll(&mut self) -> Poll<S, E> {
        match self.inner.poll() {
            Ok(Async::Ready(Ok(response))) => Ok(Async::Ready(response)),
            Ok(Async::Ready(Err(e))) => Err(e),
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Err(canceled) => Err(E::from(canceled)),
        }
    }
}

impl<S, E> fmt::Debug for Response<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Response {{ .. }}")
    }
}
