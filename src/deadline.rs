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

//! Absolute call deadlines and their wire encoding (§4.5, §6).
//!
//! A deadline is chosen once, at call creation, and is immutable afterward
//! (I3). It is never sent over the wire as an absolute clock reading —
//! clocks disagree between peers — only as a relative "milliseconds
//! remaining" header, reconstructed into a local absolute instant on
//! arrival. Consequently client and server deadlines are expected to agree
//! only within a few seconds of skew, never exactly (§4.5).

use std::time::{Duration, Instant};

use crate::metadata::Metadata;

/// The header name carrying remaining time in milliseconds. Absence means
/// no deadline (§6).
const DEADLINE_HEADER: &str = "grpc-timeout-millis";

/// A call's deadline: either a concrete instant, or one of the two
/// sentinels called out in §4.5.
#[derive(Clone, Copy, Debug)]
pub enum Deadline {
    /// Fails the call with `DEADLINE_EXCEEDED` once `Instant::now()` passes
    /// this point.
    At(Instant),
    /// Never expires.
    Infinite,
    /// Already in the past at creation time; §4.5 requires the engine to
    /// fail the call rather than issue any network op.
    Past,
}

impl Deadline {
    /// A deadline `duration` from now.
    pub fn after(duration: Duration) -> Deadline {
        match Instant::now().checked_add(duration) {
            Some(instant) => Deadline::At(instant),
            None => Deadline::Infinite,
        }
    }

    pub fn infinite() -> Deadline {
        Deadline::Infinite
    }

    /// The earliest representable instant: always already expired.
    pub fn past() -> Deadline {
        Deadline::Past
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Deadline::Infinite)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        match self {
            Deadline::Infinite => false,
            Deadline::Past => true,
            Deadline::At(at) => *at <= now,
        }
    }

    /// Time left as of `now`, or `None` if infinite.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self {
            Deadline::Infinite => None,
            Deadline::Past => Some(Duration::ZERO),
            Deadline::At(at) => Some(at.saturating_duration_since(now)),
        }
    }

    /// Encode the remaining time into outbound initial metadata, millisecond
    /// granularity, as §6 specifies. A no-op for an infinite deadline.
    pub(crate) fn encode_into(&self, metadata: &mut Metadata, now: Instant) {
        if let Some(remaining) = self.remaining(now) {
            let millis = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
            metadata.push_trusted(DEADLINE_HEADER, millis.to_string());
        }
    }

    /// Reconstruct an absolute deadline in the local clock from inbound
    /// initial metadata, consuming the reserved header so the caller only
    /// ever sees user metadata afterward.
    pub(crate) fn decode_from(metadata: &mut Metadata, now: Instant) -> Deadline {
        let raw = match metadata.take(DEADLINE_HEADER).into_iter().next() {
            Some(raw) => raw,
            None => return Deadline::Infinite,
        };
        let millis = match std::str::from_utf8(&raw).ok().and_then(|s| s.parse::<u64>().ok()) {
            Some(millis) => millis,
            None => return Deadline::Infinite,
        };
        match now.checked_add(Duration::from_millis(millis)) {
            Some(at) => Deadline::At(at),
            None => Deadline::Infinite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_deadline_encodes_to_nothing() {
        let mut md = Metadata::new();
        Deadline::Infinite.encode_into(&mut md, Instant::now());
        assert!(md.is_empty());
    }

    #[test]
    fn deadline_survives_encode_decode_within_a_few_millis() {
        let now = Instant::now();
        let d = Deadline::after(Duration::from_secs(7 * 24 * 3600));
        let mut md = Metadata::new();
        d.encode_into(&mut md, now);

        let decoded = Deadline::decode_from(&mut md, now);
        assert!(md.is_empty(), "reserved header must be consumed");
        match (d, decoded) {
            (Deadline::At(a), Deadline::At(b)) => {
                let drift = if a > b { a - b } else { b - a };
                assert!(drift < Duration::from_secs(1));
            }
            _ => panic!("expected concrete deadlines on both sides"),
        }
    }

    #[test]
    fn past_deadline_is_always_expired() {
        assert!(Deadline::past().is_expired(Instant::now()));
    }
}
