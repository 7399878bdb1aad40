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

//! The server-side half of accepting a call (§4.7).
//!
//! Unlike a client, a server never submits `RecvInitialMetadata` itself —
//! its view of the request that opened the stream (method, authority, user
//! metadata, and the decoded deadline) is handed over exactly once, as a
//! [`RequestContext`], the moment `Server::request_call` pairs with an
//! accepted stream.

use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;

use crate::call::{Call, Direction};
use crate::cq::CompletionQueue;
use crate::deadline::Deadline;
use crate::metadata::Metadata;
use crate::transport::{AcceptedStream, Transport};

/// Everything a server learns about a newly-accepted call, plus the `Call`
/// handle it now owns to drive that side of the stream.
pub struct RequestContext {
    pub call: Call,
    pub method: String,
    pub authority: String,
    /// User metadata only — the reserved deadline header has already been
    /// consumed into `deadline` (§6).
    pub metadata: Metadata,
    pub deadline: Deadline,
}

/// Builds a `RequestContext` from a freshly-accepted stream: decodes the
/// deadline out of the incoming metadata and constructs the server-side
/// `Call` that will drive it.
pub(crate) fn accept_request(
    accepted: AcceptedStream,
    transport: Arc<dyn Transport>,
    cq: CompletionQueue,
    runtime: Handle,
) -> RequestContext {
    let AcceptedStream { stream_id, headers } = accepted;
    let mut metadata = headers.metadata;
    let deadline = Deadline::decode_from(&mut metadata, Instant::now());

    let call = Call::new(
        stream_id,
        Direction::Server,
        headers.method.clone(),
        headers.authority.clone(),
        deadline,
        transport,
        cq,
        runtime,
    );

    RequestContext {
        call,
        method: headers.method,
        authority: headers.authority,
        metadata,
        deadline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::LoopbackHub;

    #[tokio::test]
    async fn accepting_a_request_decodes_its_deadline() {
        let hub = LoopbackHub::new(8);
        let client = hub.client();
        let server = hub.server();

        let mut md = Metadata::new();
        md.push("x-request-id", "42").unwrap();

        let stream = client.open_stream();
        let call = Call::new(
            stream,
            Direction::Client,
            "/svc/Method".into(),
            "localhost".into(),
            Deadline::after(std::time::Duration::from_secs(10)),
            Arc::new(client),
            CompletionQueue::new(),
            Handle::current(),
        );
        call.start_batch(vec![crate::call::Op::SendInitialMetadata(md)], crate::tag::Tag::from(1))
            .unwrap();

        let accepted = crate::transport::Listener::accept(&server).await.unwrap();
        let ctx = accept_request(accepted, Arc::new(server), CompletionQueue::new(), Handle::current());

        assert_eq!(ctx.method, "/svc/Method");
        assert_eq!(ctx.metadata.get("x-request-id"), Some(b"42".as_slice()));
        assert!(!ctx.deadline.is_infinite());
    }
}
