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

//! The closed set of RPC status codes and the status value attached to a
//! finished call.

use crate::metadata::Metadata;

/// The closed set of status codes a call can finish with.
///
/// This mirrors the set a higher-layer RPC system standardizes on; the core
/// never invents new codes and never retries based on one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    pub fn is_ok(self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::Ok
    }
}

/// Status returned at the end of an RPC: a code, optional human-readable
/// details, and trailing metadata the server chose to attach.
#[derive(Clone, Debug, Default)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub details: Option<String>,
    pub trailing_metadata: Metadata,
}

impl RpcStatus {
    /// Build a status carrying an explicit code and details.
    pub fn new(code: StatusCode, details: Option<String>) -> RpcStatus {
        RpcStatus {
            code,
            details,
            trailing_metadata: Metadata::new(),
        }
    }

    /// The `OK` status, with no details and no trailing metadata.
    pub fn ok() -> RpcStatus {
        RpcStatus::new(StatusCode::Ok, None)
    }

    pub fn with_trailing_metadata(mut self, metadata: Metadata) -> RpcStatus {
        self.trailing_metadata = metadata;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}
