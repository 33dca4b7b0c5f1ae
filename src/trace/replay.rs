//! Replay verification against a reference trace.
//!
//! A reference is a private copy of a previously observed event sequence
//! (captured live or imported from a binary artifact). Verification walks
//! the live trace against it and classifies the first divergence.

use crate::status::Status;
use crate::trace::ring::{TRACE_RING_CAPACITY, TraceEvent, TraceRing, digest_events};

/// Classification of a replay comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayResult {
    /// The live trace matches the reference.
    Match,
    /// The traces have different lengths (prefix matched).
    LengthMismatch,
    /// Event kinds differ at the divergence index.
    KindMismatch,
    /// Entity ids differ at the divergence index.
    EntityMismatch,
    /// Auxiliary words differ at the divergence index.
    AuxMismatch,
    /// Events compare equal but the digests differ (sequence skew).
    DigestMismatch,
}

/// The outcome of a verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    /// What was found.
    pub result: ReplayResult,
    /// Index of the first divergence (or the compared length on a match
    /// or length mismatch).
    pub divergence_index: u64,
}

impl ReplayReport {
    /// Whether the comparison found no divergence.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self.result, ReplayResult::Match)
    }
}

/// Holder for the active replay reference.
#[derive(Debug, Default)]
pub struct ReplayState {
    reference: Option<Vec<TraceEvent>>,
    reference_digest: u64,
}

impl ReplayState {
    /// Creates an empty replay state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a private copy of up to ring-capacity events as the
    /// reference. Longer inputs are rejected with `InvalidArgument`.
    pub fn load_reference(&mut self, events: &[TraceEvent]) -> Result<(), Status> {
        if events.len() > TRACE_RING_CAPACITY {
            return Err(Status::InvalidArgument);
        }
        self.reference_digest = digest_events(events);
        self.reference = Some(events.to_vec());
        Ok(())
    }

    /// Returns whether a reference is loaded.
    #[must_use]
    pub const fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Drops the reference.
    pub fn clear_reference(&mut self) {
        self.reference = None;
        self.reference_digest = 0;
    }

    /// Compares the live trace against the reference.
    ///
    /// Absence of a reference is a trivial match.
    #[must_use]
    pub fn verify(&self, live: &TraceRing) -> ReplayReport {
        let Some(reference) = self.reference.as_deref() else {
            return ReplayReport {
                result: ReplayResult::Match,
                divergence_index: 0,
            };
        };
        let live_events = live.readable_events();
        let n = reference.len().min(live_events.len());
        for i in 0..n {
            let (want, got) = (&reference[i], &live_events[i]);
            let result = if want.kind != got.kind {
                ReplayResult::KindMismatch
            } else if want.entity != got.entity {
                ReplayResult::EntityMismatch
            } else if want.aux != got.aux {
                ReplayResult::AuxMismatch
            } else {
                continue;
            };
            return ReplayReport {
                result,
                divergence_index: i as u64,
            };
        }
        if reference.len() != live_events.len() {
            return ReplayReport {
                result: ReplayResult::LengthMismatch,
                divergence_index: n as u64,
            };
        }
        if self.reference_digest != digest_events(&live_events) {
            return ReplayReport {
                result: ReplayResult::DigestMismatch,
                divergence_index: n as u64,
            };
        }
        ReplayReport {
            result: ReplayResult::Match,
            divergence_index: n as u64,
        }
    }
}
