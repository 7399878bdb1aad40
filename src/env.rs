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

//! Process-wide runtime state (§4.8).
//!
//! An `Environment` owns the pool of completion queues that `Channel`s and
//! `Server`s are handed out of, and the tokio runtime that every batch's
//! transport I/O actually runs on. It is deliberately *not* where
//! `next`/`pluck` run — those block whatever OS thread the application calls
//! them from, which is never required to be a tokio worker (§5).

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Handle, Runtime};

use crate::cq::CompletionQueue;

enum EnvRuntime {
    /// A runtime this environment started and owns; dropped along with it.
    Owned(Runtime),
    /// A handle into a runtime the host application already runs, for
    /// embedding rpcio inside an existing tokio program.
    Borrowed(Handle),
}

/// Process-wide (or at least application-subsystem-wide) runtime state: a
/// worker pool plus a fixed number of completion queues, handed out to new
/// channels and servers round-robin.
pub struct Environment {
    runtime: EnvRuntime,
    cqs: Vec<CompletionQueue>,
    next_cq: AtomicUsize,
}

impl Environment {
    /// Starts a dedicated multi-thread tokio runtime and `cq_count`
    /// completion queues. Drop the returned `Environment` outside of any
    /// other tokio runtime's async context — tokio refuses to tear down a
    /// runtime from inside one.
    pub fn new(cq_count: usize) -> Environment {
        assert!(cq_count > 0, "an environment needs at least one completion queue");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("rpcio-worker")
            .build()
            .expect("failed to start the rpcio worker runtime");
        Environment {
            runtime: EnvRuntime::Owned(runtime),
            cqs: (0..cq_count).map(|_| CompletionQueue::new()).collect(),
            next_cq: AtomicUsize::new(0),
        }
    }

    /// Builds an environment that schedules batch execution onto an
    /// already-running tokio runtime instead of starting its own.
    pub fn with_handle(handle: Handle, cq_count: usize) -> Environment {
        assert!(cq_count > 0, "an environment needs at least one completion queue");
        Environment {
            runtime: EnvRuntime::Borrowed(handle),
            cqs: (0..cq_count).map(|_| CompletionQueue::new()).collect(),
            next_cq: AtomicUsize::new(0),
        }
    }

    pub(crate) fn runtime_handle(&self) -> Handle {
        match &self.runtime {
            EnvRuntime::Owned(runtime) => runtime.handle().clone(),
            EnvRuntime::Borrowed(handle) => handle.clone(),
        }
    }

    pub fn completion_queues(&self) -> &[CompletionQueue] {
        &self.cqs
    }

    /// Hands out a completion queue, round-robin, to spread calls and
    /// accepted streams across the pool instead of funneling everything
    /// through one (§4.8).
    pub fn pick_cq(&self) -> CompletionQueue {
        let i = self.next_cq.fetch_add(1, Ordering::Relaxed) % self.cqs.len();
        self.cqs[i].clone()
    }

    /// Shuts down every completion queue in the pool, waking any thread
    /// blocked in `next`/`pluck` on one of them.
    pub fn shutdown(&self) {
        for cq in &self.cqs {
            cq.shutdown();
        }
    }
}
