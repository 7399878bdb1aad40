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

//! The server request loop (§4.7).
//!
//! A `Server` pairs two independent streams of events — the application
//! posting `request_call(cq, tag)` to say "I'm ready for the next incoming
//! RPC", and the transport's [`Listener`] handing over newly-arrived
//! streams — on a strict first-come-first-served basis, in whichever order
//! they actually happen to arrive. Neither side blocks waiting for the
//! other: an early `request_call` just waits in a queue for a stream, and a
//! stream that arrives with no outstanding `request_call` waits in a queue
//! for one, bounded so a slow application can't be made to buffer streams
//! without limit (§9, unmatched-incoming-stream backpressure).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::call::server::accept_request;
use crate::call::Call;
use crate::cq::CompletionQueue;
use crate::env::Environment;
use crate::error::Error;
use crate::status::StatusCode;
use crate::tag::Tag;
use crate::transport::{AcceptedStream, Listener, Transport};

const DEFAULT_REQUEST_SLOTS_PER_CQ: usize = 1024;
const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Configures a [`Server`] before it is built.
pub struct ServerBuilder {
    env: Arc<Environment>,
    slots_per_cq: usize,
    shutdown_grace_period: Duration,
}

impl ServerBuilder {
    pub fn new(env: Arc<Environment>) -> ServerBuilder {
        ServerBuilder {
            env,
            slots_per_cq: DEFAULT_REQUEST_SLOTS_PER_CQ,
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
        }
    }

    /// Bounds how many accepted streams may wait, unmatched, for a
    /// `request_call` before new arrivals are rejected outright with
    /// `UNAVAILABLE` (§9). One bound for the whole server, scaled by the
    /// number of completion queues in the environment's pool, mirroring the
    /// teacher's per-cq slot bookkeeping without needing a queue per cq.
    pub fn request_slots_per_cq(mut self, slots: usize) -> ServerBuilder {
        self.slots_per_cq = slots;
        self
    }

    /// Bounds how long `shutdown_and_notify` waits for calls already in
    /// flight to finish on their own before cancelling whatever is left
    /// (§4.7: "allows in-flight calls to complete or be cancelled after a
    /// grace period"). Default 5 seconds.
    pub fn shutdown_grace_period(mut self, grace_period: Duration) -> ServerBuilder {
        self.shutdown_grace_period = grace_period;
        self
    }

    /// Binds this builder to a connected, accept-capable transport. In
    /// practice `transport` and `listener` are usually the same concrete
    /// value (e.g. `transport::loopback::LoopbackServer` implements both
    /// traits) handed in twice as distinct trait objects.
    pub fn build(self, transport: Arc<dyn Transport>, listener: Arc<dyn Listener>) -> Server {
        let backlog_limit = self.slots_per_cq * self.env.completion_queues().len().max(1);
        Server {
            inner: Arc::new(Inner {
                env: self.env,
                transport,
                listener,
                backlog_limit,
                shutdown_grace_period: self.shutdown_grace_period,
                shut_down: AtomicBool::new(false),
                pending_requests: Mutex::new(VecDeque::new()),
                pending_streams: Mutex::new(VecDeque::new()),
                active_calls: Mutex::new(Vec::new()),
                accept_loop: Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    env: Arc<Environment>,
    transport: Arc<dyn Transport>,
    listener: Arc<dyn Listener>,
    backlog_limit: usize,
    shutdown_grace_period: Duration,
    shut_down: AtomicBool,
    pending_requests: Mutex<VecDeque<(CompletionQueue, Tag)>>,
    pending_streams: Mutex<VecDeque<AcceptedStream>>,
    /// Server-side `Call` handles handed out by `pair`, kept around so
    /// `shutdown_and_notify` can tell whether anything is still in flight
    /// (§4.7's grace period). Pruned of already-finished calls whenever a
    /// new one is paired, so this never grows past the number of calls
    /// genuinely still open at once.
    active_calls: Mutex<Vec<Call>>,
    accept_loop: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Inner {
    /// Pairs one outstanding `request_call` with one accepted stream,
    /// posting the `IncomingCall` event. Only ever called while holding
    /// whichever side's lock just became non-empty, so the other side's
    /// lock is taken fresh here.
    fn pair(self: &Arc<Self>, cq: CompletionQueue, tag: Tag, accepted: AcceptedStream) {
        let ctx = accept_request(accepted, self.transport.clone(), cq.clone(), self.env.runtime_handle());
        debug!("paired request_call tag={:?} with method {}", tag, ctx.method);
        {
            let mut active = self.active_calls.lock().unwrap();
            active.retain(|call| !call.is_finished());
            active.push(ctx.call.clone());
        }
        cq.complete_incoming_call(tag, Ok(ctx));
    }
}

/// A bound listening endpoint. Cheap to clone.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    /// Registers readiness for the next incoming RPC on `cq`, to be
    /// delivered as an `Event::IncomingCall { tag, .. }` (§4.7). If a stream
    /// is already waiting unmatched, this pairs immediately and returns
    /// having posted the event synchronously; otherwise it just enqueues
    /// the request for the accept loop to find.
    pub fn request_call(&self, cq: &CompletionQueue, tag: Tag) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            warn!("request_call after shutdown, tag={:?}", tag);
            return;
        }
        let waiting = self.inner.pending_streams.lock().unwrap().pop_front();
        match waiting {
            Some(accepted) => self.inner.pair(cq.clone(), tag, accepted),
            None => self.inner.pending_requests.lock().unwrap().push_back((cq.clone(), tag)),
        }
    }

    /// Starts the background accept loop. Each accepted stream is paired
    /// with the oldest outstanding `request_call`, or queued (bounded by
    /// `request_slots_per_cq`, §9) until one arrives.
    pub fn start(&self) {
        let inner = self.inner.clone();
        let handle = inner.env.runtime_handle().spawn(async move {
            loop {
                if inner.shut_down.load(Ordering::Acquire) {
                    break;
                }
                let accepted = match inner.listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                let waiting = inner.pending_requests.lock().unwrap().pop_front();
                match waiting {
                    Some((cq, tag)) => inner.pair(cq, tag, accepted),
                    None => {
                        let mut streams = inner.pending_streams.lock().unwrap();
                        if streams.len() >= inner.backlog_limit {
                            warn!("server backlog full, rejecting an unmatched incoming stream");
                            drop(streams);
                            inner.transport.reset(accepted.stream_id, StatusCode::Unavailable).await;
                        } else {
                            streams.push_back(accepted);
                        }
                    }
                }
            }
        });
        *self.inner.accept_loop.lock().unwrap() = Some(handle);
    }

    /// Stops accepting new streams, fails every still-unmatched
    /// `request_call` with `Error::ShutdownFailed`, resets every
    /// still-unmatched accepted stream, waits up to `shutdown_grace_period`
    /// for calls already in flight to finish on their own, cancels whatever
    /// is left, and only then posts `tag`'s completion on `cq` (§4.7: "allows
    /// in-flight calls to complete or be cancelled after a grace period,
    /// then posts one completion"). Returns immediately; the work happens on
    /// a spawned task so this itself never blocks.
    pub fn shutdown_and_notify(&self, cq: &CompletionQueue, tag: Tag) {
        self.inner.shut_down.store(true, Ordering::Release);
        if let Some(handle) = self.inner.accept_loop.lock().unwrap().take() {
            handle.abort();
        }

        let inner = self.inner.clone();
        let cq = cq.clone();
        inner.env.runtime_handle().spawn(async move {
            let abandoned: Vec<_> = inner.pending_requests.lock().unwrap().drain(..).collect();
            for (request_cq, request_tag) in abandoned {
                warn!("request_call tag={:?} abandoned by server shutdown", request_tag);
                request_cq.complete_incoming_call(request_tag, Err(Error::ShutdownFailed));
            }

            let stranded: Vec<_> = inner.pending_streams.lock().unwrap().drain(..).collect();
            for accepted in stranded {
                inner.transport.reset(accepted.stream_id, StatusCode::Unavailable).await;
            }

            let deadline = Instant::now() + inner.shutdown_grace_period;
            loop {
                let all_finished = inner
                    .active_calls
                    .lock()
                    .unwrap()
                    .iter()
                    .all(|call| call.is_finished());
                if all_finished || Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
            }

            let stragglers: Vec<_> = inner
                .active_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|call| !call.is_finished())
                .cloned()
                .collect();
            if !stragglers.is_empty() {
                warn!("{} call(s) still in flight after the shutdown grace period, cancelling", stragglers.len());
                for call in stragglers {
                    call.cancel();
                }
            }

            cq.complete(tag, Ok(crate::call::BatchResult::default()));
        });
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cq::Event;
    use crate::deadline::Deadline;
    use crate::transport::loopback::LoopbackHub;
    use std::time::Duration;

    #[tokio::test]
    async fn a_stream_arriving_before_request_call_waits_to_be_matched() {
        let env = Arc::new(Environment::new(1));
        let hub = LoopbackHub::new(8);
        let client = Arc::new(hub.client());
        let server_side = Arc::new(hub.server());
        let server = ServerBuilder::new(env.clone())
            .build(server_side.clone(), server_side);
        server.start();

        let stream = client.new_stream();
        client
            .write_headers(stream, "/svc/Method", "host", crate::metadata::Metadata::new())
            .await
            .unwrap();

        // give the accept loop a moment to observe and queue the stream.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cq = env.pick_cq();
        let tag = Tag::from(7);
        server.request_call(&cq, tag);

        let event = tokio::task::spawn_blocking({
            let cq = cq.clone();
            move || cq.next(Deadline::after(Duration::from_millis(200)))
        })
        .await
        .unwrap();

        match event {
            Event::IncomingCall { tag: got, result } => {
                assert_eq!(got, tag);
                assert_eq!(result.unwrap().method, "/svc/Method");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
