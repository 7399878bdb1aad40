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

//! The call engine at the core of a general-purpose RPC runtime.
//!
//! This crate is the part of an RPC system that drives one call between a
//! client and a server once a transport is already connected: a per-call
//! state machine (`call`), a batched async operation dispatcher
//! (`call::Call::start_batch`), a completion queue that serializes
//! notifications back to the application (`cq`), deadline/cancellation
//! plumbing (`deadline`), and per-call credential binding (`credentials`).
//!
//! What this crate does *not* do: it does not frame bytes onto a socket (see
//! [`transport::Transport`], a trait the engine consumes — this crate ships
//! only an in-process [`transport::loopback`] reference implementation), it
//! does not resolve names or load-balance, it does not mint credentials, and
//! it does not generate service stubs from an IDL. Those are all external
//! collaborators a production deployment supplies.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rpcio::call::client::CallOption;
//! use rpcio::call::Op;
//! use rpcio::channel::ChannelBuilder;
//! use rpcio::cq::{Event, CompletionQueue};
//! use rpcio::deadline::Deadline;
//! use rpcio::env::Environment;
//! use rpcio::server::ServerBuilder;
//! use rpcio::tag::Tag;
//! use rpcio::transport::loopback::LoopbackHub;
//!
//! let env = Arc::new(Environment::new(1));
//! let hub = LoopbackHub::new(8);
//! let server_transport = Arc::new(hub.server());
//! let server = ServerBuilder::new(env.clone()).build(server_transport.clone(), server_transport);
//! server.start();
//!
//! let channel = ChannelBuilder::new(env.clone()).build(Arc::new(hub.client()));
//! let opt = CallOption::new().timeout(Duration::from_secs(5));
//! let cq = channel.cq();
//! let call = channel.create_call("/echo/Ping", &cq, &opt);
//! call.start_batch(
//!     vec![Op::SendInitialMetadata(Default::default()), Op::SendCloseFromClient],
//!     Tag::from(1),
//! ).unwrap();
//! match cq.next(Deadline::after(Duration::from_secs(1))) {
//!     Event::OpComplete { .. } => {}
//!     other => panic!("unexpected {other:?}"),
//! }
//! call.destroy();
//! ```

pub mod buffer;
pub mod call;
pub mod channel;
pub mod cq;
pub mod credentials;
pub mod deadline;
pub mod env;
pub mod error;
pub mod metadata;
pub mod server;
pub mod status;
pub mod tag;
pub mod transport;

pub use buffer::ByteBuffer;
pub use call::{Call, Direction, Op, OpResult, BatchResult};
pub use channel::{Channel, ChannelBuilder};
pub use cq::{CompletionQueue, Event};
pub use credentials::{CallCredentials, ChannelCredentials};
pub use deadline::Deadline;
pub use env::Environment;
pub use error::{Error, Result};
pub use metadata::Metadata;
pub use server::{Server, ServerBuilder};
pub use status::{RpcStatus, StatusCode};
pub use tag::Tag;
pub use transport::Transport;
