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

//! An in-process duplex [`Transport`]/[`Listener`] pair.
//!
//! Two `HEADERS`-then-`MESSAGE*`-then-`TRAILERS` streams run over a pair of
//! unbounded `tokio::sync::mpsc` channels, one per direction, multiplexed by
//! stream id. This is a reference/test double, not a production transport —
//! it exists so this crate's own integration tests and doc examples can
//! drive the engine end to end without standing up real networking.
//!
//! A client's `write_headers` is special: unlike every other op, it does not
//! put a frame on the wire between two already-connected ends, it is what
//! *announces* the stream to the listening server in the first place,
//! exactly as a real HTTP/2 `HEADERS` frame both opens a stream and carries
//! `:path`/`:authority` (§4.7). Every other write lands in the appropriate
//! direction's channel for the peer to read back out, in order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{AcceptedStream, IncomingHeaders, Listener, OpFlags, StreamId, Transport, TrailerSignal};
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::status::{RpcStatus, StatusCode};

/// A single frame multiplexed over one direction's channel.
#[derive(Debug)]
enum Frame {
    /// A server's response initial metadata.
    Headers(Metadata),
    Message(ByteBuffer, OpFlags),
    /// `None` is a client's half-close; `Some` is a server's trailing status.
    Trailers(Option<RpcStatus>),
    Reset(StatusCode),
}

/// One direction's channel, with a one-frame lookahead buffer so a read
/// that turns out to belong to a different op (e.g. `read_message` hitting
/// the trailers that follow the last message) can hand it back instead of
/// swallowing it.
struct Pipe {
    tx: mpsc::UnboundedSender<Frame>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Frame>>,
    stash: AsyncMutex<Option<Frame>>,
}

impl Pipe {
    fn new() -> Pipe {
        let (tx, rx) = mpsc::unbounded_channel();
        Pipe {
            tx,
            rx: AsyncMutex::new(rx),
            stash: AsyncMutex::new(None),
        }
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::Transport("peer dropped the stream".into()))
    }

    async fn recv(&self) -> Option<Frame> {
        let mut stash = self.stash.lock().await;
        if let Some(frame) = stash.take() {
            return Some(frame);
        }
        drop(stash);
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    async fn unrecv(&self, frame: Frame) {
        *self.stash.lock().await = Some(frame);
    }
}

struct StreamState {
    /// Client writes, server reads.
    c2s: Pipe,
    /// Server writes, client reads.
    s2c: Pipe,
}

/// Shared state backing one client/server pair. Build one with
/// [`LoopbackHub::new`], then hand [`LoopbackHub::client`] to whatever
/// builds a `Channel` and [`LoopbackHub::server`] to whatever builds a
/// `Server`.
pub struct LoopbackHub {
    next_id: AtomicU64,
    streams: StdMutex<HashMap<StreamId, Arc<StreamState>>>,
    accept_tx: mpsc::UnboundedSender<AcceptedStream>,
    accept_rx: AsyncMutex<mpsc::UnboundedReceiver<AcceptedStream>>,
    backlog_limit: usize,
    backlog_len: AtomicU64,
}

impl LoopbackHub {
    /// `backlog_limit` bounds how many accepted-but-not-yet-pulled streams
    /// may queue up, mirroring `request_slots_per_cq` (§9); once exceeded,
    /// a client's `write_headers` fails rather than queuing unboundedly.
    pub fn new(backlog_limit: usize) -> Arc<LoopbackHub> {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        Arc::new(LoopbackHub {
            next_id: AtomicU64::new(1),
            streams: StdMutex::new(HashMap::new()),
            accept_tx,
            accept_rx: AsyncMutex::new(accept_rx),
            backlog_limit,
            backlog_len: AtomicU64::new(0),
        })
    }

    fn insert_stream(&self) -> StreamId {
        let id = StreamId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = StreamState {
            c2s: Pipe::new(),
            s2c: Pipe::new(),
        };
        self.streams.lock().unwrap().insert(id, Arc::new(state));
        id
    }

    fn stream(&self, id: StreamId) -> Result<Arc<StreamState>> {
        self.streams
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("no such loopback stream: {:?}", id.value())))
    }

    pub fn client(self: &Arc<Self>) -> LoopbackClient {
        LoopbackClient { hub: self.clone() }
    }

    pub fn server(self: &Arc<Self>) -> LoopbackServer {
        LoopbackServer { hub: self.clone() }
    }
}

/// Push a reset into both directions; best-effort, matching the transport
/// contract that cancellation has no success/failure to report (§4.5).
async fn reset_both(state: &StreamState, reason: StatusCode) {
    let _ = state.c2s.send(Frame::Reset(reason)).await;
    let _ = state.s2c.send(Frame::Reset(reason)).await;
}

fn interpret_trailers(frame: Option<Frame>) -> Result<TrailerSignal> {
    match frame {
        Some(Frame::Trailers(None)) => Ok(TrailerSignal::ClosedNormally),
        Some(Frame::Trailers(Some(status))) => Ok(TrailerSignal::Status(status)),
        Some(Frame::Reset(_)) => Ok(TrailerSignal::Cancelled),
        Some(_) => Err(Error::Transport("unexpected frame while reading trailers".into())),
        None => Ok(TrailerSignal::Cancelled),
    }
}

/// The client-facing half of a loopback hub.
#[derive(Clone)]
pub struct LoopbackClient {
    hub: Arc<LoopbackHub>,
}

impl LoopbackClient {
    /// Reserve a stream id for an outgoing call. Invisible to the server
    /// until [`Transport::write_headers`] runs. Equivalent to
    /// `Transport::new_stream`; kept as an inherent method too so tests
    /// don't need the trait in scope just to set up a stream.
    pub fn open_stream(&self) -> StreamId {
        self.hub.insert_stream()
    }
}

#[async_trait]
impl Transport for LoopbackClient {
    fn new_stream(&self) -> StreamId {
        self.hub.insert_stream()
    }

    async fn write_headers(
        &self,
        stream: StreamId,
        method: &str,
        authority: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let prev = self.hub.backlog_len.fetch_add(1, Ordering::AcqRel);
        if prev as usize >= self.hub.backlog_limit {
            self.hub.backlog_len.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::Transport(
                "server backlog full, rejecting new call (UNAVAILABLE)".into(),
            ));
        }
        let accepted = AcceptedStream {
            stream_id: stream,
            headers: IncomingHeaders {
                method: method.to_owned(),
                authority: authority.to_owned(),
                metadata,
            },
        };
        self.hub
            .accept_tx
            .send(accepted)
            .map_err(|_| Error::Transport("server gone".into()))
    }

    async fn write_message(&self, stream: StreamId, message: ByteBuffer, flags: OpFlags) -> Result<()> {
        let state = self.hub.stream(stream)?;
        state.c2s.send(Frame::Message(message, flags)).await
    }

    async fn write_trailers(&self, stream: StreamId, status: Option<RpcStatus>) -> Result<()> {
        let state = self.hub.stream(stream)?;
        state.c2s.send(Frame::Trailers(status)).await
    }

    async fn read_headers(&self, stream: StreamId) -> Result<Metadata> {
        let state = self.hub.stream(stream)?;
        match state.s2c.recv().await {
            Some(Frame::Headers(md)) => Ok(md),
            Some(other) => {
                state.s2c.unrecv(other).await;
                Err(Error::Transport("expected response headers frame".into()))
            }
            None => Err(Error::RemoteStopped),
        }
    }

    async fn read_message(&self, stream: StreamId) -> Result<Option<ByteBuffer>> {
        let state = self.hub.stream(stream)?;
        match state.s2c.recv().await {
            Some(Frame::Message(buf, _)) => Ok(Some(buf)),
            Some(other @ Frame::Trailers(_)) | Some(other @ Frame::Reset(_)) => {
                state.s2c.unrecv(other).await;
                Ok(None)
            }
            Some(other) => {
                state.s2c.unrecv(other).await;
                Err(Error::Transport("unexpected frame while reading a message".into()))
            }
            None => Ok(None),
        }
    }

    async fn read_trailers(&self, stream: StreamId) -> Result<TrailerSignal> {
        let state = self.hub.stream(stream)?;
        interpret_trailers(state.s2c.recv().await)
    }

    async fn reset(&self, stream: StreamId, reason: StatusCode) {
        if let Ok(state) = self.hub.stream(stream) {
            reset_both(&state, reason).await;
        }
    }
}

/// The server-facing half of a loopback hub.
#[derive(Clone)]
pub struct LoopbackServer {
    hub: Arc<LoopbackHub>,
}

#[async_trait]
impl Transport for LoopbackServer {
    fn new_stream(&self) -> StreamId {
        self.hub.insert_stream()
    }

    async fn write_headers(
        &self,
        stream: StreamId,
        _method: &str,
        _authority: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let state = self.hub.stream(stream)?;
        state.s2c.send(Frame::Headers(metadata)).await
    }

    async fn write_message(&self, stream: StreamId, message: ByteBuffer, flags: OpFlags) -> Result<()> {
        let state = self.hub.stream(stream)?;
        state.s2c.send(Frame::Message(message, flags)).await
    }

    async fn write_trailers(&self, stream: StreamId, status: Option<RpcStatus>) -> Result<()> {
        let state = self.hub.stream(stream)?;
        state.s2c.send(Frame::Trailers(status)).await
    }

    async fn read_headers(&self, _stream: StreamId) -> Result<Metadata> {
        Err(Error::Transport(
            "a server observes opening headers via Listener::accept, not read_headers".into(),
        ))
    }

    async fn read_message(&self, stream: StreamId) -> Result<Option<ByteBuffer>> {
        let state = self.hub.stream(stream)?;
        match state.c2s.recv().await {
            Some(Frame::Message(buf, _)) => Ok(Some(buf)),
            Some(other @ Frame::Trailers(_)) | Some(other @ Frame::Reset(_)) => {
                state.c2s.unrecv(other).await;
                Ok(None)
            }
            Some(other) => {
                state.c2s.unrecv(other).await;
                Err(Error::Transport("unexpected frame while reading a message".into()))
            }
            None => Ok(None),
        }
    }

    async fn read_trailers(&self, stream: StreamId) -> Result<TrailerSignal> {
        let state = self.hub.stream(stream)?;
        interpret_trailers(state.c2s.recv().await)
    }

    async fn reset(&self, stream: StreamId, reason: StatusCode) {
        if let Ok(state) = self.hub.stream(stream) {
            reset_both(&state, reason).await;
        }
    }
}

#[async_trait]
impl Listener for LoopbackServer {
    async fn accept(&self) -> Result<AcceptedStream> {
        let mut rx = self.hub.accept_rx.lock().await;
        match rx.recv().await {
            Some(accepted) => {
                self.hub.backlog_len.fetch_sub(1, Ordering::AcqRel);
                Ok(accepted)
            }
            None => Err(Error::Transport("hub gone".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pair(backlog: usize) -> (LoopbackClient, LoopbackServer) {
        let hub = LoopbackHub::new(backlog);
        (hub.client(), hub.server())
    }

    #[tokio::test]
    async fn client_headers_are_visible_to_accept() {
        let (client, server) = new_pair(8);
        let stream = client.open_stream();
        let mut md = Metadata::new();
        md.push("x-test", "1").unwrap();
        client
            .write_headers(stream, "/svc/Method", "localhost", md)
            .await
            .unwrap();

        let accepted = server.accept().await.unwrap();
        assert_eq!(accepted.stream_id, stream);
        assert_eq!(accepted.headers.method, "/svc/Method");
        assert_eq!(accepted.headers.metadata.get("x-test"), Some(b"1".as_slice()));
    }

    #[tokio::test]
    async fn messages_and_trailers_survive_interleaved_reads() {
        let (client, server) = new_pair(8);
        let stream = client.open_stream();
        client
            .write_headers(stream, "/svc/Method", "localhost", Metadata::new())
            .await
            .unwrap();
        server.accept().await.unwrap();

        server
            .write_message(stream, ByteBuffer::from(&b"hello"[..]), OpFlags::empty())
            .await
            .unwrap();
        server
            .write_trailers(stream, Some(RpcStatus::ok()))
            .await
            .unwrap();

        let msg = client.read_message(stream).await.unwrap();
        assert_eq!(msg.unwrap().to_vec(), b"hello");

        let eos = client.read_message(stream).await.unwrap();
        assert!(eos.is_none());

        match client.read_trailers(stream).await.unwrap() {
            TrailerSignal::Status(status) => assert!(status.is_ok()),
            other => panic!("expected a status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn backlog_limit_rejects_excess_calls() {
        let (client, _server) = new_pair(1);
        let first = client.open_stream();
        client
            .write_headers(first, "/svc/Method", "localhost", Metadata::new())
            .await
            .unwrap();

        let second = client.open_stream();
        let err = client
            .write_headers(second, "/svc/Method", "localhost", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn reset_is_observed_as_cancelled_trailers() {
        let (client, server) = new_pair(8);
        let stream = client.open_stream();
        client
            .write_headers(stream, "/svc/Method", "localhost", Metadata::new())
            .await
            .unwrap();
        server.accept().await.unwrap();

        client.reset(stream, StatusCode::Cancelled).await;

        match server.read_trailers(stream).await.unwrap() {
            TrailerSignal::Cancelled => {}
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
}
