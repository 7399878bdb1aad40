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

//! The call state machine and operation batch executor (§4.2, §4.3, §4.4).
//!
//! A `Call` pairs one side of a stream (client or server) with its transport
//! handle and tracks just enough state to reject an invalid batch at submit
//! time: which side (send/recv) has reached its terminal op, and whether
//! initial metadata has gone out yet. Everything else about a batch —
//! talking to the transport, collecting each op's result — happens on a
//! spawned task so `start_batch` itself never blocks (§4.4).

pub mod client;
pub mod server;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::{debug, error, trace, warn};
use tokio::runtime::Handle;

use crate::buffer::ByteBuffer;
use crate::credentials::{AnyCredentials, CallCredentials};
use crate::cq::CompletionQueue;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::status::{RpcStatus, StatusCode};
use crate::tag::Tag;
use crate::transport::{OpFlags, StreamId, TrailerSignal};

/// Which side of a stream a `Call` represents. A handful of ops are legal on
/// only one side (§4.3): `SendCloseFromClient`/`RecvStatusOnClient` are
/// client-only, `SendStatusFromServer`/`RecvCloseOnServer` are server-only.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    Client,
    Server,
}

/// The public operation enumeration (§6, exposed verbatim). Every batch is
/// a `Vec<Op>` submitted together; the engine validates the whole batch
/// before running any of it.
#[derive(Debug)]
pub enum Op {
    SendInitialMetadata(Metadata),
    SendMessage(ByteBuffer, OpFlags),
    SendCloseFromClient,
    SendStatusFromServer(RpcStatus),
    RecvInitialMetadata,
    RecvMessage,
    RecvStatusOnClient,
    RecvCloseOnServer,
}

/// One op's outcome, positionally aligned with the `Op` it answers.
#[derive(Debug)]
pub enum OpResult {
    Sent,
    InitialMetadata(Metadata),
    /// `None` is a clean end of the message stream, not a failure.
    Message(Option<ByteBuffer>),
    Status(RpcStatus),
    Closed { cancelled: bool },
}

/// A whole batch's outcome: one `OpResult` per submitted `Op`, in order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub results: Vec<OpResult>,
}

struct CallState {
    send_initial_submitted: bool,
    send_closed: bool,
    recv_initial_submitted: bool,
    recv_closed: bool,
    credentials: Option<Arc<dyn CallCredentials>>,
}

impl CallState {
    fn new() -> CallState {
        CallState {
            send_initial_submitted: false,
            send_closed: false,
            recv_initial_submitted: false,
            recv_closed: false,
            credentials: None,
        }
    }

    fn finished(&self) -> bool {
        self.send_closed && self.recv_closed
    }
}

/// Checks a whole batch against the call's side-local state machine without
/// committing anything, then commits only if every op is legal — a batch is
/// all-or-nothing (§4.3).
fn validate(direction: Direction, state: &mut CallState, ops: &[Op]) -> Result<()> {
    if ops.is_empty() {
        return Err(Error::InvalidBatch("a batch must contain at least one op".into()));
    }

    let mut send_initial_submitted = state.send_initial_submitted;
    let mut send_closed = state.send_closed;
    let mut recv_initial_submitted = state.recv_initial_submitted;
    let mut recv_closed = state.recv_closed;
    // Per-batch only: a single batch may carry at most one `SendMessage` and
    // one `RecvMessage` (§4.3); sending/receiving more than one message is
    // two batches, not one.
    let mut send_message_in_batch = false;
    let mut recv_message_in_batch = false;

    for op in ops {
        match op {
            Op::SendInitialMetadata(_) => {
                if send_initial_submitted {
                    return Err(Error::InvalidBatch("initial metadata already sent".into()));
                }
                send_initial_submitted = true;
            }
            Op::SendMessage(..) => {
                if !send_initial_submitted {
                    return Err(Error::InvalidBatch(
                        "cannot send a message before initial metadata".into(),
                    ));
                }
                if send_closed {
                    return Err(Error::InvalidBatch(
                        "cannot send a message after the send side closed".into(),
                    ));
                }
                if send_message_in_batch {
                    return Err(Error::InvalidBatch(
                        "a batch may contain at most one SendMessage".into(),
                    ));
                }
                send_message_in_batch = true;
            }
            Op::SendCloseFromClient => {
                if direction != Direction::Client {
                    return Err(Error::InvalidBatch("send-close-from-client is client-only".into()));
                }
                if send_closed {
                    return Err(Error::InvalidBatch("send side already closed".into()));
                }
                send_closed = true;
            }
            Op::SendStatusFromServer(_) => {
                if direction != Direction::Server {
                    return Err(Error::InvalidBatch("send-status-from-server is server-only".into()));
                }
                if send_closed {
                    return Err(Error::InvalidBatch("send side already closed".into()));
                }
                send_closed = true;
            }
            Op::RecvInitialMetadata => {
                if direction != Direction::Client {
                    return Err(Error::InvalidBatch(
                        "recv-initial-metadata is client-only; a server's initial metadata \
                         arrives once via accept"
                            .into(),
                    ));
                }
                if recv_initial_submitted {
                    return Err(Error::InvalidBatch("initial metadata already requested".into()));
                }
                recv_initial_submitted = true;
            }
            Op::RecvMessage => {
                if recv_closed {
                    return Err(Error::InvalidBatch(
                        "cannot receive a message after the recv side closed".into(),
                    ));
                }
                if recv_message_in_batch {
                    return Err(Error::InvalidBatch(
                        "a batch may contain at most one RecvMessage".into(),
                    ));
                }
                recv_message_in_batch = true;
            }
            Op::RecvStatusOnClient => {
                if direction != Direction::Client {
                    return Err(Error::InvalidBatch("recv-status-on-client is client-only".into()));
                }
                if recv_closed {
                    return Err(Error::InvalidBatch("recv side already closed".into()));
                }
                recv_closed = true;
            }
            Op::RecvCloseOnServer => {
                if direction != Direction::Server {
                    return Err(Error::InvalidBatch("recv-close-on-server is server-only".into()));
                }
                if recv_closed {
                    return Err(Error::InvalidBatch("recv side already closed".into()));
                }
                recv_closed = true;
            }
        }
    }

    state.send_initial_submitted = send_initial_submitted;
    state.send_closed = send_closed;
    state.recv_initial_submitted = recv_initial_submitted;
    state.recv_closed = recv_closed;
    Ok(())
}

struct Inner {
    stream_id: StreamId,
    direction: Direction,
    method: String,
    authority: String,
    deadline: Deadline,
    transport: Arc<dyn crate::transport::Transport>,
    cq: CompletionQueue,
    runtime: Handle,
    state: Mutex<CallState>,
    destroyed: AtomicBool,
}

/// A handle to one side of one stream. Cheap to clone: clones share the same
/// underlying call (§3 "Call").
#[derive(Clone)]
pub struct Call {
    inner: Arc<Inner>,
}

impl Call {
    pub(crate) fn new(
        stream_id: StreamId,
        direction: Direction,
        method: String,
        authority: String,
        deadline: Deadline,
        transport: Arc<dyn crate::transport::Transport>,
        cq: CompletionQueue,
        runtime: Handle,
    ) -> Call {
        debug!(
            "call created: stream={:?} direction={:?} method={}",
            stream_id, direction, method
        );
        let call = Call {
            inner: Arc::new(Inner {
                stream_id,
                direction,
                method,
                authority,
                deadline,
                transport,
                cq,
                runtime,
                state: Mutex::new(CallState::new()),
                destroyed: AtomicBool::new(false),
            }),
        };
        call.spawn_deadline_watchdog();
        call
    }

    /// If the deadline is concrete, arms a task that resets the stream with
    /// `DEADLINE_EXCEEDED` the instant it elapses, unless the call has
    /// already finished normally (§4.5).
    fn spawn_deadline_watchdog(&self) {
        let Deadline::At(at) = self.inner.deadline else {
            return;
        };
        let inner = self.inner.clone();
        self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            let finished = inner.state.lock().unwrap().finished();
            if !finished && !inner.destroyed.load(Ordering::Acquire) {
                debug!("deadline exceeded on stream {:?}, resetting", inner.stream_id);
                inner.transport.reset(inner.stream_id, StatusCode::DeadlineExceeded).await;
            }
        });
    }

    pub fn method(&self) -> &str {
        &self.inner.method
    }

    pub fn authority(&self) -> &str {
        &self.inner.authority
    }

    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }

    /// Whether both the send and recv sides of this call have reached a
    /// terminal state. Used by `Server::shutdown_and_notify` to decide when
    /// an in-flight call no longer needs to be waited on (§4.7).
    pub(crate) fn is_finished(&self) -> bool {
        self.inner.state.lock().unwrap().finished()
    }

    /// Attaches a per-call credential (§4.6). Only legal on a client call
    /// that has not yet sent its initial metadata; a `ChannelCredentials`
    /// (or any attempt on a server call) is rejected at runtime (P4) rather
    /// than merely by the type system.
    pub fn set_credentials(&self, credentials: impl Into<AnyCredentials>) -> Result<()> {
        let call_credentials = match credentials.into() {
            AnyCredentials::Call(creds) => creds,
            AnyCredentials::Channel(_) => {
                return Err(Error::CredentialTypeMismatch(
                    "channel credentials cannot be bound to a call",
                ));
            }
        };
        if self.inner.direction != Direction::Client {
            return Err(Error::CredentialTypeMismatch(
                "call credentials can only be bound to a client call",
            ));
        }
        let mut state = self.inner.state.lock().unwrap();
        if state.send_initial_submitted {
            return Err(Error::CredentialTypeMismatch(
                "call credentials must be set before the first batch is submitted",
            ));
        }
        state.credentials = Some(call_credentials);
        Ok(())
    }

    /// Clears a previously attached per-call credential (§8 seed scenario
    /// 7's "override/clear").
    pub fn clear_credentials(&self) {
        self.inner.state.lock().unwrap().credentials = None;
    }

    /// Validates `ops` against the call's state machine, and if the batch is
    /// legal, submits it for asynchronous execution. Returns synchronously
    /// either way — the batch's actual outcome arrives later as an
    /// `Event::OpComplete` for `tag` (§4.4).
    pub fn start_batch(&self, ops: Vec<Op>, tag: Tag) -> Result<()> {
        if self.inner.destroyed.load(Ordering::Acquire) {
            error!("start_batch on an already-destroyed call (stream {:?})", self.inner.stream_id);
            return Err(Error::AlreadyDestroyed);
        }

        let mut state = self.inner.state.lock().unwrap();
        if state.finished() {
            return Err(Error::CallAlreadyFinished);
        }

        let opens_call = self.inner.direction == Direction::Client
            && !state.send_initial_submitted
            && ops.iter().any(|op| matches!(op, Op::SendInitialMetadata(_)));
        if opens_call && self.inner.deadline.is_expired(Instant::now()) {
            warn!(
                "call to {} opened with an already-expired deadline, failing without a network op",
                self.inner.method
            );
            return Err(Error::RpcFailure(RpcStatus::new(
                StatusCode::DeadlineExceeded,
                Some("deadline had already passed when the call was created".into()),
            )));
        }

        trace!("start_batch: stream={:?} ops={}", self.inner.stream_id, ops.len());
        validate(self.inner.direction, &mut state, &ops)?;
        let credentials = state.credentials.clone();
        drop(state);

        let call = self.clone();
        self.inner.runtime.spawn(async move {
            let result = call.run_batch(ops, credentials).await;
            call.inner.cq.complete(tag, result);
        });
        Ok(())
    }

    async fn run_batch(
        &self,
        ops: Vec<Op>,
        credentials: Option<Arc<dyn CallCredentials>>,
    ) -> Result<BatchResult> {
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            results.push(self.run_op(op, credentials.as_deref()).await?);
        }
        Ok(BatchResult { results })
    }

    async fn run_op(&self, op: Op, credentials: Option<&dyn CallCredentials>) -> Result<OpResult> {
        let inner = &self.inner;
        match op {
            Op::SendInitialMetadata(mut metadata) => {
                if inner.direction == Direction::Client {
                    inner.deadline.encode_into(&mut metadata, Instant::now());
                    if let Some(creds) = credentials {
                        let extra = creds.get_metadata(&inner.authority, &inner.method).await.map_err(|e| {
                            warn!("call credential failed to mint metadata for {}: {e}", inner.method);
                            e
                        })?;
                        for (key, value) in extra {
                            metadata.push(key, value)?;
                        }
                    }
                    inner
                        .transport
                        .write_headers(inner.stream_id, &inner.method, &inner.authority, metadata)
                        .await?;
                } else {
                    inner.transport.write_headers(inner.stream_id, "", "", metadata).await?;
                }
                Ok(OpResult::Sent)
            }
            Op::SendMessage(message, flags) => {
                inner.transport.write_message(inner.stream_id, message, flags).await?;
                Ok(OpResult::Sent)
            }
            Op::SendCloseFromClient => {
                inner.transport.write_trailers(inner.stream_id, None).await?;
                Ok(OpResult::Sent)
            }
            Op::SendStatusFromServer(status) => {
                inner.transport.write_trailers(inner.stream_id, Some(status)).await?;
                Ok(OpResult::Sent)
            }
            Op::RecvInitialMetadata => {
                let metadata = inner.transport.read_headers(inner.stream_id).await?;
                Ok(OpResult::InitialMetadata(metadata))
            }
            Op::RecvMessage => {
                let message = inner.transport.read_message(inner.stream_id).await?;
                Ok(OpResult::Message(message))
            }
            Op::RecvStatusOnClient => {
                let status = match inner.transport.read_trailers(inner.stream_id).await? {
                    TrailerSignal::Status(status) => status,
                    TrailerSignal::Cancelled => {
                        RpcStatus::new(StatusCode::Cancelled, Some("call was cancelled".into()))
                    }
                    TrailerSignal::ClosedNormally => RpcStatus::ok(),
                };
                Ok(OpResult::Status(status))
            }
            Op::RecvCloseOnServer => {
                let cancelled =
                    matches!(inner.transport.read_trailers(inner.stream_id).await?, TrailerSignal::Cancelled);
                Ok(OpResult::Closed { cancelled })
            }
        }
    }

    /// Best-effort cancellation (§4.5): resets the stream if the call hasn't
    /// already finished. Returns immediately; the peer observes the
    /// cancellation through its own `RecvStatusOnClient`/`RecvCloseOnServer`.
    pub fn cancel(&self) {
        if self.inner.state.lock().unwrap().finished() {
            return;
        }
        debug!("call cancelled: stream={:?}", self.inner.stream_id);
        let inner = self.inner.clone();
        inner.runtime.spawn(async move {
            inner.transport.reset(inner.stream_id, StatusCode::Cancelled).await;
        });
    }

    /// Releases this handle. A call still in flight is implicitly cancelled
    /// first, mirroring the C core's "destroy cancels if not already done"
    /// behavior; a call that already reached both terminal states is simply
    /// freed.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            error!("double destroy on call stream={:?}", self.inner.stream_id);
            return;
        }
        debug!("call destroyed: stream={:?}", self.inner.stream_id);
        let finished = self.inner.state.lock().unwrap().finished();
        if !finished {
            let inner = self.inner.clone();
            inner.runtime.spawn(async move {
                inner.transport.reset(inner.stream_id, StatusCode::Cancelled).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::LoopbackHub;

    fn test_call(direction: Direction) -> (Call, tokio::runtime::Runtime) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let hub = LoopbackHub::new(8);
        let transport: Arc<dyn crate::transport::Transport> = match direction {
            Direction::Client => Arc::new(hub.client()),
            Direction::Server => Arc::new(hub.server()),
        };
        let call = Call::new(
            StreamId::new(1),
            direction,
            "/svc/Method".into(),
            "localhost".into(),
            Deadline::infinite(),
            transport,
            CompletionQueue::new(),
            rt.handle().clone(),
        );
        (call, rt)
    }

    #[test]
    fn duplicate_send_initial_metadata_in_one_batch_is_rejected() {
        let (call, _rt) = test_call(Direction::Client);
        let err = call
            .start_batch(
                vec![
                    Op::SendInitialMetadata(Metadata::new()),
                    Op::SendInitialMetadata(Metadata::new()),
                ],
                Tag::from(1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
    }

    #[test]
    fn send_close_from_client_is_rejected_on_a_server_call() {
        let (call, _rt) = test_call(Direction::Server);
        let err = call
            .start_batch(vec![Op::SendCloseFromClient], Tag::from(1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
    }

    #[test]
    fn message_before_initial_metadata_is_rejected() {
        let (call, _rt) = test_call(Direction::Client);
        let err = call
            .start_batch(
                vec![Op::SendMessage(ByteBuffer::new(), OpFlags::empty())],
                Tag::from(1),
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
    }

    #[test]
    fn a_batch_opening_an_already_expired_call_fails_with_deadline_exceeded() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let hub = LoopbackHub::new(8);
        let call = Call::new(
            StreamId::new(1),
            Direction::Client,
            "/svc/Method".into(),
            "localhost".into(),
            Deadline::past(),
            Arc::new(hub.client()),
            CompletionQueue::new(),
            rt.handle().clone(),
        );
        let err = call
            .start_batch(vec![Op::SendInitialMetadata(Metadata::new())], Tag::from(1))
            .unwrap_err();
        match err {
            Error::RpcFailure(status) => assert_eq!(status.code, StatusCode::DeadlineExceeded),
            other => panic!("expected RpcFailure, got {other:?}"),
        }
    }

    #[test]
    fn destroying_a_finished_call_does_not_reset_the_stream() {
        let (call, rt) = test_call(Direction::Client);
        {
            let mut state = call.inner.state.lock().unwrap();
            state.send_closed = true;
            state.recv_closed = true;
        }
        call.destroy();
        // no panic, no outstanding spawn needed; dropping the runtime here
        // would panic if a task were still scheduled against it incorrectly.
        rt.shutdown_timeout(std::time::Duration::from_millis(50));
    }
}
