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

use crate::status::RpcStatus;

/// The crate-wide result alias.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Everything that can go wrong in the call engine.
///
/// Submit-time errors (returned synchronously from `Call::start_batch`,
/// `Server::request_call`, credential binding) are distinguished from
/// call-level errors (surfaced through `recv-status-on-client`) only by
/// *when* the caller sees them; both live in this one enum because both are
/// explicit return values, never panics or exceptions, per the engine's
/// exception-free contract.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A batch was rejected at submit time because it violates the call
    /// state machine (duplicate op, wrong-direction op, op after the send
    /// or recv side already reached its terminal state, ...).
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// The call's send or recv side (or both) already reached its terminal
    /// state; no further ops of that kind may be submitted.
    #[error("call already finished")]
    CallAlreadyFinished,

    /// `set_credentials` was called with a channel-level credential, or on
    /// a server-side call; both are rejected per the credential binding
    /// contract.
    #[error("credential type mismatch: {0}")]
    CredentialTypeMismatch(&'static str),

    /// A per-call credential failed to mint outbound metadata.
    #[error("credentials failed: {0}")]
    CredentialsFailed(String),

    /// The completion queue has been shut down; no new work may reference
    /// it.
    #[error("completion queue is shut down")]
    QueueShutdown,

    /// More than one outstanding `pluck` was attempted for the same tag.
    #[error("a pluck is already outstanding for this tag")]
    DuplicatePluck,

    /// A handle was used after `destroy`, or `destroy` was called twice.
    #[error("handle already destroyed")]
    AlreadyDestroyed,

    /// The remote peer reset the stream or otherwise stopped responding.
    #[error("remote peer stopped responding")]
    RemoteStopped,

    /// A call finished with a non-OK status.
    #[error("rpc failed: {0:?} {1:?}", .0.code, .0.details)]
    RpcFailure(RpcStatus),

    /// A metadata key or value violated the binary-safety rules (§3: keys
    /// suffixed `-bin` may hold arbitrary bytes, others must be ASCII).
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The transport reported a failure performing a stream operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// Posted to a `request_call` that was still waiting, unmatched, when
    /// `Server::shutdown_and_notify` ran: no stream will ever arrive for it
    /// (§4.7).
    #[error("server shut down before a stream arrived for this request_call")]
    ShutdownFailed,
}
