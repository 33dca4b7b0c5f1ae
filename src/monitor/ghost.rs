//! Ghost protocol and linearity monitors.
//!
//! The monitors are strictly observational: the transition tables refuse
//! illegal mutations, and the monitors record that the attempt happened.
//! Recording never blocks and never fails; when the ring overflows the
//! oldest entries are overwritten and the readable window slides forward.

use core::fmt;

/// Capacity of the ghost violation ring.
pub const GHOST_RING_CAPACITY: usize = 64;

/// The kind of observed violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GhostKind {
    /// An illegal region transition was attempted.
    ProtocolRegion,
    /// An illegal task transition was attempted.
    ProtocolTask,
    /// An illegal obligation transition was attempted.
    ProtocolObligation,
    /// An obligation was resolved more than once.
    LinearityDouble,
    /// An obligation was still reserved at region drain.
    LinearityLeak,
}

impl GhostKind {
    /// Returns the lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolRegion => "protocol-region",
            Self::ProtocolTask => "protocol-task",
            Self::ProtocolObligation => "protocol-obligation",
            Self::LinearityDouble => "linearity-double",
            Self::LinearityLeak => "linearity-leak",
        }
    }
}

impl fmt::Display for GhostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GhostViolation {
    /// Monotone sequence number across the run.
    pub sequence: u64,
    /// What was violated.
    pub kind: GhostKind,
    /// Packed handle bits of the offending entity.
    pub entity: u64,
    /// State ordinal the entity was in.
    pub from_state: u8,
    /// State ordinal the mutation aimed for (or the same ordinal for
    /// non-transition violations).
    pub to_state: u8,
}

/// Bounded, overflow-aware ring of observed violations.
#[derive(Debug)]
pub struct GhostRing {
    entries: Vec<GhostViolation>,
    head: usize,
    total: u64,
}

impl GhostRing {
    /// Creates an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(GHOST_RING_CAPACITY),
            head: 0,
            total: 0,
        }
    }

    /// Records a violation, overwriting the oldest entry on overflow.
    pub fn record(&mut self, kind: GhostKind, entity: u64, from_state: u8, to_state: u8) -> u64 {
        let sequence = self.total;
        self.total += 1;
        let violation = GhostViolation {
            sequence,
            kind,
            entity,
            from_state,
            to_state,
        };
        tracing::warn!(
            target: "lockstep::ghost",
            kind = kind.as_str(),
            entity,
            from_state,
            to_state,
            "ghost violation"
        );
        if self.entries.len() < GHOST_RING_CAPACITY {
            self.entries.push(violation);
        } else {
            self.entries[self.head] = violation;
            self.head = (self.head + 1) % GHOST_RING_CAPACITY;
        }
        sequence
    }

    /// Number of violations currently readable (capped at capacity).
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Total violations ever recorded, including overwritten ones.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Returns the `i`-th readable violation, oldest first.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<GhostViolation> {
        if i >= self.entries.len() {
            return None;
        }
        let idx = if self.overflowed() {
            (self.head + i) % GHOST_RING_CAPACITY
        } else {
            i
        };
        Some(self.entries[idx])
    }

    /// Whether entries have been overwritten.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.total as usize > GHOST_RING_CAPACITY
    }

    /// Clears the ring and its counters.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.head = 0;
        self.total = 0;
    }
}

impl Default for GhostRing {
    fn default() -> Self {
        Self::new()
    }
}
