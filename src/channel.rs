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

//! A client's handle to a connected peer (§4.6, §6).
//!
//! Establishing the underlying connection — name resolution, load
//! balancing, the TLS handshake itself — is the transport's concern and sits
//! outside the core (§1); a `Channel` just wraps an already-connected
//! [`Transport`] and knows how to mint new `Call`s against it.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::call::{Call, Direction};
use crate::call::client::CallOption;
use crate::credentials::{AnyCredentials, ChannelCredentials};
use crate::cq::CompletionQueue;
use crate::env::Environment;
use crate::transport::Transport;

/// Configures a [`Channel`] before it is built.
pub struct ChannelBuilder {
    env: Arc<Environment>,
    default_authority: Option<String>,
    credentials: Option<ChannelCredentials>,
}

impl ChannelBuilder {
    pub fn new(env: Arc<Environment>) -> ChannelBuilder {
        ChannelBuilder {
            env,
            default_authority: None,
            credentials: None,
        }
    }

    /// Authority to send on a call that doesn't override it explicitly.
    pub fn default_authority(mut self, authority: impl Into<String>) -> ChannelBuilder {
        self.default_authority = Some(authority.into());
        self
    }

    /// Channel-level credentials, bound once here and never attachable to a
    /// `Call` directly (§4.6). Purely descriptive at this layer — the core
    /// never inspects them, it just refuses to let `Call::set_credentials`
    /// accept one (P4).
    pub fn channel_credentials(mut self, credentials: ChannelCredentials) -> ChannelBuilder {
        self.credentials = Some(credentials);
        self
    }

    /// Binds this builder to an already-connected transport.
    pub fn build(self, transport: Arc<dyn Transport>) -> Channel {
        Channel {
            inner: Arc::new(ChannelInner {
                env: self.env,
                transport,
                default_authority: self.default_authority,
                _credentials: self.credentials,
            }),
        }
    }
}

struct ChannelInner {
    env: Arc<Environment>,
    transport: Arc<dyn Transport>,
    default_authority: Option<String>,
    _credentials: Option<ChannelCredentials>,
}

/// A client's handle to a connected peer. Cheap to clone.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Mints a new client-side `Call` for `method`, bound to `cq` for the
    /// lifetime of every batch submitted on it (§4.1 — a call's completion
    /// queue is fixed at creation, mirroring `grpc_channel_create_call`
    /// taking a `cq` argument directly rather than picking one implicitly),
    /// with its deadline from `opt`. No network activity happens here — the
    /// first batch that includes `SendInitialMetadata` is what actually
    /// opens the stream (§4.7).
    pub fn create_call(&self, method: &str, cq: &CompletionQueue, opt: &CallOption) -> Call {
        let stream_id = self.inner.transport.new_stream();
        let cq = cq.clone();
        let authority = self
            .inner
            .default_authority
            .clone()
            .unwrap_or_else(|| method.to_owned());

        let call = Call::new(
            stream_id,
            Direction::Client,
            method.to_owned(),
            authority,
            opt.resolve_deadline(),
            self.inner.transport.clone(),
            cq,
            self.runtime_handle(),
        );

        if let Some(credentials) = opt.take_call_credentials() {
            // `opt` already proved this is a call credential by construction
            // (`CallOption::call_credentials` only accepts `Arc<dyn
            // CallCredentials>`), so binding it here can't fail.
            let _ = call.set_credentials(AnyCredentials::from(credentials));
        }

        call
    }

    fn runtime_handle(&self) -> Handle {
        self.inner.env.runtime_handle()
    }

    /// Hands out any one completion queue from the environment's pool, for
    /// callers that don't need a specific call's queue (e.g. to drive
    /// `Server::request_call` from the client side of a test). Not tied to
    /// any particular `Call` — pass the same queue into `create_call` if a
    /// call's completions need to land on a queue you already hold.
    pub fn cq(&self) -> CompletionQueue {
        self.inner.env.pick_cq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::loopback::LoopbackHub;

    #[test]
    fn create_call_carries_the_default_authority() {
        let env = Arc::new(Environment::new(1));
        let hub = LoopbackHub::new(8);
        let channel = ChannelBuilder::new(env)
            .default_authority("svc.internal")
            .build(Arc::new(hub.client()));

        let cq = channel.cq();
        let call = channel.create_call("/svc/Method", &cq, &CallOption::new());
        assert_eq!(call.authority(), "svc.internal");
        assert_eq!(call.method(), "/svc/Method");
    }
}
