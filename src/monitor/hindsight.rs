//! Hindsight ring: nondeterminism-boundary observations.
//!
//! Every kernel call that crosses a nondeterminism boundary (clock read,
//! entropy read, reactor readiness, signal arrival, tie-break, timer
//! coalescing) logs what it observed together with the trace sequence at
//! the time of the call. Two runs that diverge can then be explained by
//! the first differing observation rather than by guesswork.

use crate::status::Status;
use crate::util::RunDigest;
use core::fmt;
use serde_json::json;

/// Capacity of the hindsight ring.
pub const HINDSIGHT_RING_CAPACITY: usize = 256;

/// The boundary a hindsight event was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HindsightKind {
    /// A clock was read.
    ClockRead,
    /// An entropy source was read.
    EntropyRead,
    /// The reactor reported I/O readiness.
    IoReadiness,
    /// The reactor timed out.
    IoTimeout,
    /// A signal arrived.
    SignalArrival,
    /// The scheduler broke a tie.
    SchedTieBreak,
    /// Multiple timers coalesced into one expiry batch.
    TimerCoalesce,
}

impl HindsightKind {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClockRead => "clock-read",
            Self::EntropyRead => "entropy-read",
            Self::IoReadiness => "io-readiness",
            Self::IoTimeout => "io-timeout",
            Self::SignalArrival => "signal-arrival",
            Self::SchedTieBreak => "sched-tie-break",
            Self::TimerCoalesce => "timer-coalesce",
        }
    }

    /// Stable numeric code folded into the digest.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::ClockRead => 0,
            Self::EntropyRead => 1,
            Self::IoReadiness => 2,
            Self::IoTimeout => 3,
            Self::SignalArrival => 4,
            Self::SchedTieBreak => 5,
            Self::TimerCoalesce => 6,
        }
    }
}

impl fmt::Display for HindsightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One nondeterminism-boundary observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HindsightEvent {
    /// Monotone sequence number across the run.
    pub sequence: u64,
    /// The trace sequence at the time of the call.
    pub trace_seq: u64,
    /// The boundary kind.
    pub kind: HindsightKind,
    /// Packed handle bits of the involved entity, or 0.
    pub entity: u64,
    /// The observed value (timestamp, random word, readiness count, ...).
    pub observed: u64,
}

/// Flush policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HindsightPolicy {
    /// Dump JSON when a ghost violation is present.
    pub flush_on_invariant: bool,
    /// Dump JSON when replay verification diverges.
    pub flush_on_divergence: bool,
}

/// Bounded, overflow-aware, digested ring of observations.
#[derive(Debug)]
pub struct HindsightRing {
    entries: Vec<HindsightEvent>,
    head: usize,
    total: u64,
    digest: RunDigest,
    policy: HindsightPolicy,
}

impl HindsightRing {
    /// Creates an empty ring with a disabled flush policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(HINDSIGHT_RING_CAPACITY),
            head: 0,
            total: 0,
            digest: RunDigest::new(),
            policy: HindsightPolicy::default(),
        }
    }

    /// Logs one observation, overwriting the oldest entry on overflow.
    pub fn log(&mut self, kind: HindsightKind, trace_seq: u64, entity: u64, observed: u64) -> u64 {
        let sequence = self.total;
        self.total += 1;
        self.digest.fold_u64(u64::from(kind.code()));
        self.digest.fold_u64(entity);
        self.digest.fold_u64(observed);
        self.digest.fold_u64(sequence);
        let event = HindsightEvent {
            sequence,
            trace_seq,
            kind,
            entity,
            observed,
        };
        if self.entries.len() < HINDSIGHT_RING_CAPACITY {
            self.entries.push(event);
        } else {
            self.entries[self.head] = event;
            self.head = (self.head + 1) % HINDSIGHT_RING_CAPACITY;
        }
        sequence
    }

    /// Total observations ever logged, including overwritten ones.
    #[must_use]
    pub const fn total_count(&self) -> u64 {
        self.total
    }

    /// Number of observations currently readable (capped at capacity).
    #[must_use]
    pub fn readable_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the `i`-th readable observation, oldest first.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<HindsightEvent> {
        if i >= self.entries.len() {
            return None;
        }
        let idx = if self.overflowed() {
            (self.head + i) % HINDSIGHT_RING_CAPACITY
        } else {
            i
        };
        Some(self.entries[idx])
    }

    /// Digest over the entire observation history.
    #[must_use]
    pub const fn digest(&self) -> u64 {
        self.digest.value()
    }

    /// Whether entries have been overwritten.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.total as usize > HINDSIGHT_RING_CAPACITY
    }

    /// Clears the ring, its counters, and its digest. Policy is retained.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.head = 0;
        self.total = 0;
        self.digest = RunDigest::new();
    }

    /// Replaces the flush policy.
    pub fn set_policy(&mut self, policy: HindsightPolicy) {
        self.policy = policy;
    }

    /// Returns the active flush policy.
    #[must_use]
    pub const fn policy_active(&self) -> HindsightPolicy {
        self.policy
    }

    /// Renders the readable window as a JSON document.
    ///
    /// Returns [`Status::Pending`] when there is nothing to flush.
    pub fn flush_json(&self) -> Result<String, Status> {
        if self.entries.is_empty() {
            return Err(Status::Pending);
        }
        let events: Vec<_> = (0..self.readable_count())
            .filter_map(|i| self.get(i))
            .map(|e| {
                json!({
                    "entity": e.entity,
                    "kind": e.kind.as_str(),
                    "observed": e.observed,
                    "sequence": e.sequence,
                    "trace_seq": e.trace_seq,
                })
            })
            .collect();
        let doc = json!({
            "digest": self.digest(),
            "events": events,
            "total_count": self.total_count(),
        });
        Ok(doc.to_string())
    }

    /// Flushes for a ghost-violation trigger, honoring the policy.
    ///
    /// Returns [`Status::Pending`] when the policy disables invariant
    /// flushes or there is nothing to flush.
    pub fn flush_on_invariant(&self) -> Result<String, Status> {
        if !self.policy.flush_on_invariant {
            return Err(Status::Pending);
        }
        self.flush_json()
    }

    /// Flushes for a replay-divergence trigger, honoring the policy.
    pub fn flush_on_divergence(&self) -> Result<String, Status> {
        if !self.policy.flush_on_divergence {
            return Err(Status::Pending);
        }
        self.flush_json()
    }
}

impl Default for HindsightRing {
    fn default() -> Self {
        Self::new()
    }
}
