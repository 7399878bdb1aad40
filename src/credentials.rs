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

//! Credential binding (§3 "Credential", §4.6).
//!
//! Two kinds of credential exist and the engine keeps them in distinct
//! types on purpose: `ChannelCredentials` establish transport security and
//! are only ever legal at channel-construction time; `CallCredentials` mint
//! auth metadata for one call at a time and are the only thing
//! `Call::set_credentials` accepts. `AnyCredentials` exists purely so that
//! passing the wrong kind to `set_credentials` is a *runtime*-testable
//! rejection (P4) rather than merely a type error a caller could not
//! trigger in a test.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Channel-level credentials (e.g. TLS material). Opaque here: the core
/// never inspects them, it only refuses to let them be bound to a `Call`.
#[derive(Clone)]
pub struct ChannelCredentials {
    _kind: &'static str,
}

impl ChannelCredentials {
    pub fn insecure() -> ChannelCredentials {
        ChannelCredentials { _kind: "insecure" }
    }

    pub fn opaque(kind: &'static str) -> ChannelCredentials {
        ChannelCredentials { _kind: kind }
    }
}

/// A per-call credential: given the service URL and method name, mints
/// metadata entries (e.g. an authorization token) to merge into the
/// outbound initial metadata.
#[async_trait]
pub trait CallCredentials: Send + Sync {
    async fn get_metadata(&self, service_url: &str, method: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// Either kind of credential, so that binding the wrong one to a `Call` is
/// rejected at runtime instead of by the type system alone.
#[derive(Clone)]
pub enum AnyCredentials {
    Call(Arc<dyn CallCredentials>),
    Channel(ChannelCredentials),
}

impl From<Arc<dyn CallCredentials>> for AnyCredentials {
    fn from(creds: Arc<dyn CallCredentials>) -> AnyCredentials {
        AnyCredentials::Call(creds)
    }
}

impl From<ChannelCredentials> for AnyCredentials {
    fn from(creds: ChannelCredentials) -> AnyCredentials {
        AnyCredentials::Channel(creds)
    }
}
