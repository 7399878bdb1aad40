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

//! The completion queue (§4.1).
//!
//! A `CompletionQueue` is a blocking rendezvous point: batches dispatched
//! from async worker tasks post one [`Event`] per tag, and *any* OS thread —
//! not necessarily the one that started the batch, and not necessarily a
//! tokio worker — drains them with [`CompletionQueue::next`] or
//! [`CompletionQueue::pluck`]. That decoupling is why this is built on a
//! plain mutex-guarded queue with a `crossbeam_channel` doorbell instead of
//! anything tokio-flavored: `next`/`pluck` must work from a thread that has
//! never touched the tokio runtime at all.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender};

use crate::call::server::RequestContext;
use crate::call::BatchResult;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::tag::Tag;

/// One thing a `next`/`pluck` caller can observe.
pub enum Event {
    /// A batch tagged `tag` finished; `result` is `Err` only for
    /// submit-independent failures discovered during execution (a
    /// transport error, for instance) — a non-OK RPC status is still
    /// `Ok(BatchResult)`, per §4.4's success/failure split.
    OpComplete { tag: Tag, result: Result<BatchResult> },
    /// `Server::request_call` paired with an accepted stream; `result` is
    /// `Err` only if the server shut down before a stream ever arrived for
    /// this request (§4.7, §4.8).
    IncomingCall { tag: Tag, result: Result<RequestContext> },
    /// The queue was shut down and has no more events to deliver.
    QueueShutdown,
    /// The caller's deadline elapsed with nothing to report.
    QueueTimeout,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::OpComplete { tag, result } => {
                f.debug_struct("OpComplete").field("tag", tag).field("result", result).finish()
            }
            Event::IncomingCall { tag, result } => f
                .debug_struct("IncomingCall")
                .field("tag", tag)
                .field("result", &result.as_ref().map(|ctx| &ctx.method))
                .finish(),
            Event::QueueShutdown => write!(f, "QueueShutdown"),
            Event::QueueTimeout => write!(f, "QueueTimeout"),
        }
    }
}

fn event_tag(event: &Event) -> Option<Tag> {
    match event {
        Event::OpComplete { tag, .. } | Event::IncomingCall { tag, .. } => Some(*tag),
        Event::QueueShutdown | Event::QueueTimeout => None,
    }
}

struct Inner {
    queue: Mutex<VecDeque<Event>>,
    ping_tx: Sender<()>,
    ping_rx: Receiver<()>,
    shut_down: AtomicBool,
    waiters: AtomicUsize,
    outstanding_plucks: Mutex<HashSet<Tag>>,
}

/// A completion queue. Cheap to clone — every clone shares the same
/// underlying queue (§4.1: a queue, not a queue-per-handle).
#[derive(Clone)]
pub struct CompletionQueue {
    inner: std::sync::Arc<Inner>,
}

impl CompletionQueue {
    pub fn new() -> CompletionQueue {
        let (ping_tx, ping_rx) = crossbeam_channel::unbounded();
        CompletionQueue {
            inner: std::sync::Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                ping_tx,
                ping_rx,
                shut_down: AtomicBool::new(false),
                waiters: AtomicUsize::new(0),
                outstanding_plucks: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Post a batch's outcome. Called from whatever task drove the batch to
    /// completion, which may be a tokio worker with no relation to whatever
    /// thread eventually calls `next`/`pluck` for this tag (§5).
    pub(crate) fn complete(&self, tag: Tag, result: Result<BatchResult>) {
        self.push(Event::OpComplete { tag, result });
    }

    /// Post a `request_call` pairing. Called the moment a `Server` matches
    /// an accepted stream to the oldest still-outstanding request (§4.7).
    pub(crate) fn complete_incoming_call(&self, tag: Tag, result: Result<RequestContext>) {
        self.push(Event::IncomingCall { tag, result });
    }

    fn push(&self, event: Event) {
        self.inner.queue.lock().unwrap().push_back(event);
        let _ = self.inner.ping_tx.try_send(());
    }

    /// Blocks the calling thread until an event arrives, `deadline` elapses,
    /// or the queue shuts down. Returns whatever event is at the front of
    /// the queue, regardless of tag.
    pub fn next(&self, deadline: Deadline) -> Event {
        loop {
            if let Some(event) = self.inner.queue.lock().unwrap().pop_front() {
                return event;
            }
            if self.inner.shut_down.load(Ordering::Acquire) {
                return Event::QueueShutdown;
            }
            if !self.wait(deadline) {
                return Event::QueueTimeout;
            }
        }
    }

    /// Blocks until the event tagged `tag` arrives, `deadline` elapses, or
    /// the queue shuts down, leaving every other pending event untouched
    /// for a concurrent `next`/`pluck` to find. Only one `pluck` per tag may
    /// be outstanding at a time (`Error::DuplicatePluck` otherwise) — a
    /// second caller plucking the same tag could otherwise race the first
    /// for the same event.
    pub fn pluck(&self, tag: Tag, deadline: Deadline) -> Result<Event> {
        if !self.inner.outstanding_plucks.lock().unwrap().insert(tag) {
            return Err(Error::DuplicatePluck);
        }
        let event = loop {
            if let Some(event) = self.take_matching(tag) {
                break event;
            }
            if self.inner.shut_down.load(Ordering::Acquire) {
                break Event::QueueShutdown;
            }
            if !self.wait(deadline) {
                break Event::QueueTimeout;
            }
        };
        self.inner.outstanding_plucks.lock().unwrap().remove(&tag);
        Ok(event)
    }

    fn take_matching(&self, tag: Tag) -> Option<Event> {
        let mut queue = self.inner.queue.lock().unwrap();
        let pos = queue.iter().position(|event| event_tag(event) == Some(tag));
        pos.and_then(|i| queue.remove(i))
    }

    /// Blocks on the doorbell channel until pinged or `deadline` elapses.
    /// Returns `false` only on a genuine timeout; a spurious wake (someone
    /// else's event arrived) returns `true` so the caller re-checks the
    /// queue.
    fn wait(&self, deadline: Deadline) -> bool {
        self.inner.waiters.fetch_add(1, Ordering::AcqRel);
        let woke = match deadline {
            Deadline::Infinite => self.inner.ping_rx.recv().is_ok(),
            Deadline::Past => false,
            Deadline::At(instant) => self.inner.ping_rx.recv_deadline(instant).is_ok(),
        };
        self.inner.waiters.fetch_sub(1, Ordering::AcqRel);
        woke
    }

    /// Marks the queue as shut down: once every already-queued event has
    /// been drained, every subsequent `next`/`pluck` returns
    /// `QueueShutdown` instead of blocking. Best-effort wakes every thread
    /// currently blocked in `wait` so none of them wait out a (possibly
    /// infinite) deadline needlessly.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        let wakes = self.inner.waiters.load(Ordering::Acquire).max(1);
        for _ in 0..wakes {
            let _ = self.inner.ping_tx.try_send(());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

impl Default for CompletionQueue {
    fn default() -> CompletionQueue {
        CompletionQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn next_returns_events_in_fifo_order() {
        let cq = CompletionQueue::new();
        cq.complete(Tag::from(1), Ok(BatchResult::default()));
        cq.complete(Tag::from(2), Ok(BatchResult::default()));

        match cq.next(Deadline::infinite()) {
            Event::OpComplete { tag, .. } => assert_eq!(tag, Tag::from(1)),
            other => panic!("unexpected {other:?}"),
        }
        match cq.next(Deadline::infinite()) {
            Event::OpComplete { tag, .. } => assert_eq!(tag, Tag::from(2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pluck_skips_non_matching_events() {
        let cq = CompletionQueue::new();
        cq.complete(Tag::from(1), Ok(BatchResult::default()));
        cq.complete(Tag::from(2), Err(Error::RemoteStopped));

        match cq.pluck(Tag::from(2), Deadline::infinite()).unwrap() {
            Event::OpComplete { tag, result } => {
                assert_eq!(tag, Tag::from(2));
                assert!(result.is_err());
            }
            other => panic!("unexpected {other:?}"),
        }

        // tag 1's event is still there for a plain `next`.
        match cq.next(Deadline::infinite()) {
            Event::OpComplete { tag, .. } => assert_eq!(tag, Tag::from(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn duplicate_pluck_on_same_tag_is_rejected() {
        let cq = CompletionQueue::new();
        let tag = Tag::from(1);
        let cq2 = cq.clone();
        let handle = std::thread::spawn(move || cq2.pluck(tag, Deadline::infinite()));
        // give the spawned pluck a chance to register itself first.
        std::thread::sleep(Duration::from_millis(20));

        assert!(matches!(cq.pluck(tag, Deadline::after(Duration::from_millis(50))), Err(Error::DuplicatePluck)));

        cq.complete(tag, Ok(BatchResult::default()));
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn next_times_out_with_a_short_deadline() {
        let cq = CompletionQueue::new();
        let event = cq.next(Deadline::after(Duration::from_millis(20)));
        assert!(matches!(event, Event::QueueTimeout));
    }

    #[test]
    fn shutdown_wakes_a_blocked_next() {
        let cq = CompletionQueue::new();
        let cq2 = cq.clone();
        let handle = std::thread::spawn(move || cq2.next(Deadline::infinite()));
        std::thread::sleep(Duration::from_millis(20));
        cq.shutdown();
        assert!(matches!(handle.join().unwrap(), Event::QueueShutdown));
    }
}
