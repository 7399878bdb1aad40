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

//! Ordered key/value metadata arrays (§3 "Metadata").
//!
//! Keys suffixed `-bin` permit arbitrary binary values; every other key must
//! carry an ASCII (visible, 0x20-0x7E) value. Ordering is preserved
//! end-to-end for repeated keys: this is a list of pairs, not a map.

use bytes::Bytes;

use crate::error::{Error, Result};

const BIN_SUFFIX: &str = "-bin";

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_' || b == b'.')
}

fn is_bin_key(key: &str) -> bool {
    key.ends_with(BIN_SUFFIX)
}

fn is_visible_ascii(value: &[u8]) -> bool {
    value.iter().all(|&b| (0x20..=0x7e).contains(&b))
}

/// An ordered list of `(key, value)` metadata entries.
///
/// Cloning a `Metadata` is cheap: values are reference-counted `Bytes`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, Bytes)>,
}

impl Metadata {
    pub fn new() -> Metadata {
        Metadata {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(cap: usize) -> Metadata {
        Metadata {
            entries: Vec::with_capacity(cap),
        }
    }

    /// Append a `(key, value)` pair, preserving prior entries under the same
    /// key. Rejects malformed keys, and rejects non-ASCII values on
    /// non-`-bin` keys.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        if !is_valid_key(&key) {
            return Err(Error::InvalidMetadata(format!("malformed key {key:?}")));
        }
        if !is_bin_key(&key) && !is_visible_ascii(&value) {
            return Err(Error::InvalidMetadata(format!(
                "non-ASCII value for non-binary key {key:?}"
            )));
        }
        self.entries.push((key, value));
        Ok(())
    }

    /// Like [`push`](Self::push), but for internally-generated entries the
    /// engine already knows are well-formed (e.g. the deadline header).
    pub(crate) fn push_trusted(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a [u8]> {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.get_all(key).next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every value stored under `key`, in order.
    pub(crate) fn take(&mut self, key: &str) -> Vec<Bytes> {
        let mut removed = Vec::new();
        self.entries.retain(|(k, v)| {
            if k == key {
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn merge(&mut self, other: Metadata) {
        self.entries.extend(other.entries);
    }
}

impl FromIterator<(String, Bytes)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, Bytes)>>(iter: T) -> Self {
        Metadata {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_metadata_round_trips_byte_exact() {
        let mut md = Metadata::new();
        let raw: Vec<u8> = vec![0xC0, 0xC1, 0x00, 0xFF, 0xCC];
        md.push("key1-bin", raw.clone()).unwrap();
        assert_eq!(md.get("key1-bin"), Some(raw.as_slice()));
    }

    #[test]
    fn non_bin_key_rejects_non_ascii_values() {
        let mut md = Metadata::new();
        let err = md.push("key1", vec![0x00, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata(_)));
    }

    #[test]
    fn preserves_order_for_repeated_keys() {
        let mut md = Metadata::new();
        md.push("x", "1").unwrap();
        md.push("x", "2").unwrap();
        let values: Vec<_> = md.get_all("x").collect();
        assert_eq!(values, vec![b"1".as_slice(), b"2".as_slice()]);
    }

    #[test]
    fn malformed_key_rejected() {
        let mut md = Metadata::new();
        assert!(md.push("Has Spaces", "v").is_err());
    }
}
