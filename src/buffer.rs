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

//! The opaque payload carrier (§3 "Byte Buffer", §4.2).
//!
//! A `ByteBuffer` is built from one or more reference-counted slices; the
//! engine never interprets its contents. `Bytes` already gives us refcounted,
//! zero-copy slicing, so a buffer is just an ordered list of them.

use bytes::Bytes;

/// An opaque, possibly multi-slice message payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    slices: Vec<Bytes>,
}

impl ByteBuffer {
    pub fn new() -> ByteBuffer {
        ByteBuffer { slices: Vec::new() }
    }

    /// Build a buffer from a single owned slice. No copy beyond whatever the
    /// caller already did to produce `bytes`.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> ByteBuffer {
        ByteBuffer {
            slices: vec![bytes.into()],
        }
    }

    /// Build a buffer from several borrowed slices, copying each one.
    /// Callers must not mutate the source bytes afterward; that invariant is
    /// satisfied automatically here since each slice is copied into its own
    /// owned, reference-counted allocation.
    pub fn from_slices(slices: &[&[u8]]) -> ByteBuffer {
        ByteBuffer {
            slices: slices.iter().map(|s| Bytes::copy_from_slice(s)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slices.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.iter().all(Bytes::is_empty)
    }

    pub fn slices(&self) -> &[Bytes] {
        &self.slices
    }

    /// Copy every slice into one contiguous `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for s in &self.slices {
            out.extend_from_slice(s);
        }
        out
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(v: Vec<u8>) -> ByteBuffer {
        ByteBuffer::from_bytes(v)
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(v: &[u8]) -> ByteBuffer {
        ByteBuffer::from_bytes(Bytes::copy_from_slice(v))
    }
}

impl From<&str> for ByteBuffer {
    fn from(v: &str) -> ByteBuffer {
        ByteBuffer::from_bytes(Bytes::copy_from_slice(v.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_multiple_slices() {
        let buf = ByteBuffer::from_slices(&[b"hello ", b"world"]);
        assert_eq!(buf.to_vec(), b"hello world");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn empty_buffer_reports_empty() {
        assert!(ByteBuffer::new().is_empty());
    }
}
