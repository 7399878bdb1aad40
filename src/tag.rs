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

//! Opaque user tags.
//!
//! The original C core passes integer-cast pointers as tags and never looks
//! inside them. We don't have raw pointers to abuse here, so a tag is just a
//! `Copy + Eq + Hash` 64-bit token the application chooses; it is threaded
//! unchanged from submission to the matching `Event`.

/// An opaque token echoed back on the `Event` that completes the batch (or
/// `request_call`, or `shutdown_and_notify`) it was submitted with.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Tag(u64);

impl Tag {
    pub const fn new(value: u64) -> Tag {
        Tag(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Tag {
    fn from(value: u64) -> Tag {
        Tag(value)
    }
}
