//! Client-side stream multiplexing for HTTP/2-style protocols.
//!
//! One connection to one peer carries many logical request/response
//! exchanges ("streams") at once. This crate owns the hard part of that
//! arrangement: admitting queued exchanges in strict FIFO order under the
//! negotiated concurrency cap, dispatching the codec's ordered events to the
//! right stream, keeping per-stream and per-connection flow-control
//! bookkeeping honest, and recovering from partial failure (a reset stream,
//! a protocol violation, an idle timeout, total connection loss) without
//! corrupting sibling exchanges.
//!
//! The wire codec itself (frame parsing, header compression, window
//! arithmetic) is an external collaborator behind the [`Codec`] trait, and
//! transport establishment is the caller's problem: hand [`bind`] an
//! established duplex byte stream and get back a [`Client`] handle whose
//! completions resolve on the reactor.
//!
//! Everything for one connection runs on a single task without preemption,
//! so no registry, queue or counter here is behind a lock. Connections are
//! independent; nothing is shared across them.
//!
//! [`Codec`]: trait.Codec.html
//! [`bind`]: fn.bind.html
//! [`Client`]: type.Client.html

#![deny(missing_docs)]

extern crate bytes;
extern crate tokio_core;
extern crate tokio_io;
extern crate tokio_service;

#[macro_use]
extern crate futures;

#[macro_use]
extern crate log;

mod client;
mod codec;
mod error;
mod message;
mod session;
mod util;

pub use client::{bind, Client, LostNotify, ResponseFuture};
pub use codec::{Codec, ErrorCode, Event, Header, StreamId};
pub use error::{ConnectionError, StreamError};
pub use message::{Config, Request, Response};
pub use session::{CompletionHandle, CompletionSender, Session};
