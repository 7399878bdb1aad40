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

//! Per-call options a client chooses at call-creation time (§4.6, §6).

use std::sync::Arc;
use std::time::Duration;

use crate::credentials::CallCredentials;
use crate::deadline::Deadline;
use crate::transport::OpFlags;

/// Options a client attaches when it creates a call, before the first batch
/// is ever submitted. Every field is optional; a default `CallOption` means
/// "no deadline, no per-call credentials, no write flags."
#[derive(Clone, Default)]
pub struct CallOption {
    deadline: Option<Deadline>,
    call_credentials: Option<Arc<dyn CallCredentials>>,
    write_flags: OpFlags,
}

impl CallOption {
    pub fn new() -> CallOption {
        CallOption::default()
    }

    /// Sets an absolute deadline directly.
    pub fn deadline(mut self, deadline: Deadline) -> CallOption {
        self.deadline = Some(deadline);
        self
    }

    /// Convenience over [`CallOption::deadline`]: a deadline `timeout` from
    /// whenever the call is actually created (§4.5 — the deadline itself is
    /// fixed at that moment, not when this option is built).
    pub fn timeout(mut self, timeout: Duration) -> CallOption {
        self.deadline = Some(Deadline::after(timeout));
        self
    }

    pub fn call_credentials(mut self, credentials: Arc<dyn CallCredentials>) -> CallOption {
        self.call_credentials = Some(credentials);
        self
    }

    pub fn write_flags(mut self, flags: OpFlags) -> CallOption {
        self.write_flags = flags;
        self
    }

    pub(crate) fn resolve_deadline(&self) -> Deadline {
        self.deadline.unwrap_or_else(Deadline::infinite)
    }

    pub(crate) fn take_call_credentials(&self) -> Option<Arc<dyn CallCredentials>> {
        self.call_credentials.clone()
    }

    pub(crate) fn get_write_flags(&self) -> OpFlags {
        self.write_flags
    }
}
