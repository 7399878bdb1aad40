// Copyright 2026 The rpcio Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

//! The transport seam (§6 "External Interfaces").
//!
//! This is the boundary of the core: a stream multiplexer that exposes
//! per-stream operations, each completing asynchronously with a
//! success/failure signal. The engine uses absolute stream ids but never
//! interprets framing — in particular it never looks inside a message
//! payload, and it treats deadlines and method/authority purely as values to
//! carry across the wire, encoded by the engine itself (see
//! [`crate::deadline`]) rather than by the transport.
//!
//! Only one implementation ships in this crate: [`loopback`], an in-process
//! duplex multiplexer used by the test suite and doc examples. A real
//! deployment supplies its own implementation (an HTTP/2 framer, typically)
//! — that implementation, and the connectivity machinery that produces a
//! connected [`Transport`] in the first place (name resolution, load
//! balancing, pooling), are external collaborators out of scope for the
//! core (§1).

pub mod loopback;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::buffer::ByteBuffer;
use crate::error::Result;
use crate::metadata::Metadata;
use crate::status::{RpcStatus, StatusCode};

bitflags! {
    /// Per-op flags. The only ones the engine itself interprets are
    /// buffering hints; everything else is forwarded to the transport
    /// opaquely, per §4.4.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct OpFlags: u32 {
        /// Hint that more writes are coming imminently; the transport may
        /// delay flushing this one to coalesce with the next.
        const BUFFER_HINT = 0b0000_0001;
        /// Hint that the caller wants this write flushed through even if it
        /// would otherwise be coalesced.
        const WRITE_THROUGH = 0b0000_0010;
    }
}

/// An absolute stream identifier. The engine treats this as an opaque
/// equality-comparable handle; only the transport knows what it names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StreamId(u64);

impl StreamId {
    pub fn new(value: u64) -> StreamId {
        StreamId(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// The request that opened a stream: method, authority, and whatever user
/// metadata the client sent, with the deadline header already stripped out
/// by the engine. Delivered to a server exactly once, via
/// [`Listener::accept`] — a server never calls `read_headers` to get this;
/// that method is for the lighter-weight response initial-metadata a
/// client receives back (§4.7).
#[derive(Clone, Debug)]
pub struct IncomingHeaders {
    pub method: String,
    pub authority: String,
    pub metadata: Metadata,
}

/// What a `read-trailers` op observes, interpreted differently depending on
/// which side calls it: a client's `recv-status-on-client` expects
/// `Status`; a server's `recv-close-on-server` expects `Cancelled` or
/// `ClosedNormally` and turns that into the `cancelled` boolean (§4.3).
#[derive(Clone, Debug)]
pub enum TrailerSignal {
    /// The final status a client observes.
    Status(RpcStatus),
    /// The peer reset the stream (explicit cancel, deadline expiry, or a
    /// transport-level reset).
    Cancelled,
    /// The peer finished sending normally (client half-close observed by a
    /// server, with no cancellation).
    ClosedNormally,
}

/// The seven stream operations the core drives a call's state machine
/// through (§6). Every method is asynchronous and fallible; a `reset` has
/// no meaningful success/failure to report back (cancellation is
/// best-effort, §4.5) so it simply fires.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Allocates a fresh stream identifier for an outgoing call. Connection
    /// bookkeeping, not one of the seven per-op primitives above — a real
    /// HTTP/2 transport would hand back the next stream id on its
    /// connection; the loopback transport hands back a hub-wide counter
    /// value. Only ever called on a client-facing transport handle.
    fn new_stream(&self) -> StreamId;

    async fn write_headers(
        &self,
        stream: StreamId,
        method: &str,
        authority: &str,
        metadata: Metadata,
    ) -> Result<()>;

    async fn write_message(&self, stream: StreamId, message: ByteBuffer, flags: OpFlags) -> Result<()>;

    /// `status = None` is a client's half-close; `status = Some(..)` is a
    /// server's trailing status.
    async fn write_trailers(&self, stream: StreamId, status: Option<RpcStatus>) -> Result<()>;

    /// Response initial-metadata, as observed by a client. A server never
    /// calls this: its view of a stream's opening headers arrives once,
    /// up front, via [`Listener::accept`].
    async fn read_headers(&self, stream: StreamId) -> Result<Metadata>;

    /// `Ok(None)` is a clean end of the message stream, not an error —
    /// callers distinguish end-of-stream from failure via `Result`, and
    /// empty-vs-absent via the `Option` (§4.4 success definition).
    async fn read_message(&self, stream: StreamId) -> Result<Option<ByteBuffer>>;

    async fn read_trailers(&self, stream: StreamId) -> Result<TrailerSignal>;

    async fn reset(&self, stream: StreamId, reason: StatusCode);
}

/// A newly-arrived incoming stream, as observed by a [`Listener`].
#[derive(Clone, Debug)]
pub struct AcceptedStream {
    pub stream_id: StreamId,
    pub headers: IncomingHeaders,
}

/// The server-side accept half of a transport: where new-call events come
/// from (§4.7). Kept separate from [`Transport`] because accepting a stream
/// and operating on an already-open one are different concerns even though
/// a concrete transport will usually implement both against shared state.
#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Waits for the next incoming stream. Returns `Err` only if the
    /// listener itself is no longer usable (e.g. the underlying socket
    /// closed); a bounded backlog policy (§4.7, §9) lives in the listener
    /// implementation, not here.
    async fn accept(&self) -> Result<AcceptedStream>;
}
